use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::os::fd::AsRawFd;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fanfind::input::pipe;
use fanfind::{CancelSignal, InterruptibleInput};

const TIMEOUT: Duration = Duration::from_secs(10);

#[test]
fn reads_lines_until_end_of_input() {
    let (read, write) = pipe().unwrap();
    let cancel = CancelSignal::new().unwrap();

    let mut writer = File::from(write);
    writer.write_all(b"dump\nexit\n").unwrap();
    drop(writer);

    let input = InterruptibleInput::new(read.as_raw_fd(), &cancel);
    let lines: Vec<String> = BufReader::new(input).lines().map(Result::unwrap).collect();
    assert_eq!(lines, vec!["dump", "exit"]);
}

#[test]
fn cancel_unblocks_a_pending_read() {
    let (read, write) = pipe().unwrap();
    let cancel = Arc::new(CancelSignal::new().unwrap());
    let (done_tx, done_rx) = mpsc::channel();

    let reader_cancel = Arc::clone(&cancel);
    let reader = thread::spawn(move || {
        let mut input = InterruptibleInput::new(read.as_raw_fd(), &reader_cancel);
        let mut buf = [0u8; 16];
        let n = input.read(&mut buf).unwrap();
        let _ = done_tx.send(n);
    });

    // The writer stays open, so only the cancel signal can end the read.
    thread::sleep(Duration::from_millis(50));
    cancel.raise();

    let n = done_rx.recv_timeout(TIMEOUT).expect("read should return after cancel");
    assert_eq!(n, 0, "a cancelled read reports end of input");
    reader.join().unwrap();
    drop(write);
}

#[test]
fn cancel_wins_over_pending_data() {
    let (read, write) = pipe().unwrap();
    let cancel = CancelSignal::new().unwrap();
    File::from(write).write_all(b"dump\n").unwrap();

    cancel.raise();
    let mut input = InterruptibleInput::new(read.as_raw_fd(), &cancel);
    let mut buf = [0u8; 16];
    assert_eq!(input.read(&mut buf).unwrap(), 0);
    // And it stays cancelled.
    assert_eq!(input.read(&mut buf).unwrap(), 0);
}

#[test]
fn raise_is_idempotent() {
    let cancel = CancelSignal::new().unwrap();
    assert!(!cancel.is_raised());
    cancel.raise();
    cancel.raise();
    cancel.raise();
    assert!(cancel.is_raised());

    // Exactly one byte was written to the signal pipe.
    let mut fds = [libc::pollfd { fd: cancel.as_raw_fd(), events: libc::POLLIN, revents: 0 }];
    let ready = unsafe { libc::poll(fds.as_mut_ptr(), 1, 0) };
    assert_eq!(ready, 1);
    let mut buf = [0u8; 8];
    let n = unsafe { libc::read(cancel.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
    assert_eq!(n, 1);
}
