use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use heapless::Deque;
use serialport::SerialPort;
use tracing::{debug, warn};

use super::{ByteBuf, Link, LinkError, LockToken, RX_BUFFER_SIZE, TX_BUFFER_SIZE};

/// Bytes the drain thread moves per port write.
const TX_BURST: usize = 64;
/// The raw path waits while the OS output queue holds at least this much.
const RAW_HIGH_WATER: u32 = 64;
const TX_IDLE: Duration = Duration::from_millis(1);
/// Back-off after a read that returned nothing without timing out.
const RX_IDLE: Duration = Duration::from_millis(1);

struct Shared {
    rx: Mutex<Deque<u8, RX_BUFFER_SIZE>>,
    tx: Mutex<ByteBuf<TX_BUFFER_SIZE>>,
    stop: AtomicBool,
    rx_overruns: AtomicU64,
}

impl Shared {
    fn rx(&self) -> MutexGuard<'_, Deque<u8, RX_BUFFER_SIZE>> {
        self.rx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tx(&self) -> MutexGuard<'_, ByteBuf<TX_BUFFER_SIZE>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Link over a real serial device.
///
/// Two worker threads play the part of the RX/TX interrupts: one fills the
/// receive queue from the port, the other drains the transmit buffer into it.
/// The buffer mutex is the only thing shared between them and tick context.
pub struct SerialLink {
    shared: Arc<Shared>,
    raw: Box<dyn SerialPort>,
    rx_thread: Option<JoinHandle<()>>,
    tx_thread: Option<JoinHandle<()>>,
}

impl SerialLink {
    pub fn new(port: Box<dyn SerialPort>) -> Result<Self, LinkError> {
        let shared = Arc::new(Shared {
            rx: Mutex::new(Deque::new()),
            tx: Mutex::new(ByteBuf::new()),
            stop: AtomicBool::new(false),
            rx_overruns: AtomicU64::new(0),
        });
        let rx_port = port.try_clone().map_err(std::io::Error::from)?;
        let tx_port = port.try_clone().map_err(std::io::Error::from)?;

        let rx_thread = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("serial-rx".into())
                .spawn(move || rx_loop(rx_port, shared))?
        };
        let tx_thread = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("serial-tx".into())
                .spawn(move || tx_loop(tx_port, shared))?
        };

        Ok(Self {
            shared,
            raw: port,
            rx_thread: Some(rx_thread),
            tx_thread: Some(tx_thread),
        })
    }

    /// Inbound bytes dropped because the receive queue was full.
    pub fn rx_overruns(&self) -> u64 {
        self.shared.rx_overruns.load(Ordering::Relaxed)
    }

    fn kick_tx(&self) {
        if let Some(t) = &self.tx_thread {
            t.thread().unpark();
        }
    }
}

impl Link for SerialLink {
    fn pending_inbound(&self) -> usize {
        self.shared.rx().len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.shared.rx().pop_front()
    }

    fn discard_inbound(&mut self) {
        self.shared.rx().clear();
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> usize {
        let mut rx = self.shared.rx();
        let mut n = 0;
        for slot in buf.iter_mut() {
            match rx.pop_front() {
                Some(b) => {
                    *slot = b;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    fn try_lock(&mut self, len: usize, token: LockToken) -> bool {
        self.shared.tx().request_lock(len, token)
    }

    fn write_locked(&mut self, bytes: &[u8], token: LockToken) -> Result<(), LinkError> {
        self.shared.tx().push_locked(bytes, token)?;
        self.kick_tx();
        Ok(())
    }

    fn raw_ready(&self) -> bool {
        // Drivers that can't report queue depth just block in write.
        self.raw
            .bytes_to_write()
            .map(|n| n < RAW_HIGH_WATER)
            .unwrap_or(true)
    }

    fn raw_write(&mut self, byte: u8) -> Result<(), LinkError> {
        self.raw.write_all(&[byte])?;
        Ok(())
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        self.kick_tx();
        for handle in [self.rx_thread.take(), self.tx_thread.take()]
            .into_iter()
            .flatten()
        {
            let _ = handle.join();
        }
    }
}

fn rx_loop(mut port: Box<dyn SerialPort>, shared: Arc<Shared>) {
    let mut buf = [0u8; 64];
    while !shared.stop.load(Ordering::Relaxed) {
        match port.read(&mut buf) {
            Ok(0) => thread::sleep(RX_IDLE),
            Ok(n) => {
                let mut rx = shared.rx();
                for &b in &buf[..n] {
                    if rx.push_back(b).is_err() {
                        shared.rx_overruns.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) => {
                warn!(error = %e, "serial rx stopped");
                break;
            }
        }
    }
    debug!("serial rx thread exit");
}

fn tx_loop(mut port: Box<dyn SerialPort>, shared: Arc<Shared>) {
    let mut out = Vec::with_capacity(TX_BURST);
    while !shared.stop.load(Ordering::Relaxed) {
        out.clear();
        shared.tx().drain_into(&mut out, TX_BURST);
        if out.is_empty() {
            thread::park_timeout(TX_IDLE);
            continue;
        }
        if let Err(e) = port.write_all(&out) {
            warn!(error = %e, "serial tx stopped");
            break;
        }
    }
    debug!("serial tx thread exit");
}
