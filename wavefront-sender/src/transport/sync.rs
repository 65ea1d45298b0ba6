use std::{
    collections::VecDeque,
    io::{self, Write as _},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use bytes::Bytes;
use crossbeam_channel::{select, tick, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::{
    category::Category,
    error::{FlushError, SendError},
};

use super::{Connection, Dialer, TransportConfiguration};

struct Worker {
    shutdown_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn stop(self) {
        // Dropping the sender disconnects the channel, which the flush loop treats as its signal to exit.
        drop(self.shutdown_tx);
        if self.handle.join().is_err() {
            error!("Flush thread panicked.");
        }
    }
}

/// A buffered, lazily connected transport for a single category.
///
/// Lines handed to [`Transport::send`] are only ever appended to an in-memory queue. They are written to the
/// connection, in order, when the transport is flushed, either explicitly or by its background flush thread. Lines
/// that could not be written stay queued for the next flush, so delivery is at-least-once: a line that was partially
/// written before a connection failure is sent again in full after reconnecting.
pub(crate) struct Transport {
    category: Category,
    config: TransportConfiguration,
    dialer: Box<dyn Dialer>,

    // Lock order: `client`, then `pending`. `send` only ever takes `pending`, so it never waits on network I/O.
    pending: Mutex<VecDeque<Bytes>>,
    client: Mutex<Option<Connection>>,

    connected: AtomicBool,
    closed: AtomicBool,
    failures: AtomicU64,
    worker: Mutex<Option<Worker>>,
}

impl Transport {
    /// Creates a new, disconnected `Transport`.
    pub fn new(category: Category, config: TransportConfiguration, dialer: Box<dyn Dialer>) -> Self {
        Transport {
            category,
            config,
            dialer,
            pending: Mutex::new(VecDeque::new()),
            client: Mutex::new(None),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            failures: AtomicU64::new(0),
            worker: Mutex::new(None),
        }
    }

    /// Returns the address this transport sends to.
    pub fn address(&self) -> &str {
        self.dialer.address()
    }

    /// Opens the connection if it is not already open.
    ///
    /// Concurrent callers are serialized, so at most one dial is in flight and every caller observes its outcome.
    pub fn connect(&self) -> Result<(), SendError> {
        let mut client = self.client.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }
        if client.is_some() {
            return Ok(());
        }

        *client = Some(self.dial()?);
        Ok(())
    }

    fn dial(&self) -> Result<Connection, SendError> {
        match self.dialer.dial() {
            Ok(connection) => {
                debug!(category = %self.category, address = self.address(), "Connected to proxy.");
                self.connected.store(true, Ordering::Release);
                Ok(connection)
            }
            Err(source) => {
                Err(SendError::Connect { address: self.address().to_string(), source })
            }
        }
    }

    /// Returns `true` if the transport currently holds an open connection.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Queues a line for the next flush.
    pub fn send(&self, line: Bytes) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }

        trace!(category = %self.category, len = line.len(), "Buffering line.");
        self.pending.lock().push_back(line);
        Ok(())
    }

    /// Returns the number of lines waiting to be flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns the number of failed flushes over the life of the transport.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    fn record_failure(&self, client: &mut Option<Connection>, unsent: VecDeque<Bytes>, error: io::Error) -> FlushError {
        self.failures.fetch_add(1, Ordering::AcqRel);
        *client = None;
        self.connected.store(false, Ordering::Release);

        let requeued = unsent.len();
        let mut pending = self.pending.lock();
        for line in unsent.into_iter().rev() {
            pending.push_front(line);
        }
        drop(pending);

        error!(category = %self.category, address = self.address(), error = %error, requeued, "Failed to flush lines.");
        FlushError::new(self.category, error)
    }

    /// Writes every queued line to the connection, in order.
    ///
    /// If the connection was dropped by an earlier failure, it is re-established first. On failure, the line being
    /// written and every line after it are put back at the front of the queue, the connection is dropped, and the
    /// failure count is incremented.
    ///
    /// Flushing a closed transport does nothing.
    pub fn flush(&self) -> Result<(), FlushError> {
        let mut client = self.client.lock();
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.write_pending(&mut client)
    }

    fn write_pending(&self, client: &mut Option<Connection>) -> Result<(), FlushError> {
        let mut lines = std::mem::take(&mut *self.pending.lock());
        if lines.is_empty() {
            return Ok(());
        }

        if client.is_none() {
            match self.dialer.dial() {
                Ok(connection) => {
                    debug!(category = %self.category, address = self.address(), "Reconnected to proxy.");
                    self.connected.store(true, Ordering::Release);
                    *client = Some(connection);
                }
                Err(e) => return Err(self.record_failure(client, lines, e)),
            }
        }

        let lines_sent = lines.len();
        while let Some(line) = lines.pop_front() {
            let result = match client.as_mut() {
                Some(connection) => connection.write_all(&line),
                None => Err(io::Error::from(io::ErrorKind::NotConnected)),
            };
            if let Err(e) = result {
                lines.push_front(line);
                return Err(self.record_failure(client, lines, e));
            }
        }
        let flushed = match client.as_mut() {
            Some(connection) => connection.flush(),
            None => Ok(()),
        };
        if let Err(e) = flushed {
            return Err(self.record_failure(client, lines, e));
        }

        trace!(category = %self.category, lines_sent, "Flushed lines.");
        Ok(())
    }

    /// Starts the background flush thread, if it is not already running.
    ///
    /// Starting a closed transport does nothing.
    pub fn start(self: &Arc<Self>) -> io::Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() || self.closed.load(Ordering::Acquire) {
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let transport = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("wavefront-sender-{}-flusher", self.category))
            .spawn(move || {
                let ticker = tick(transport.config.flush_interval);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            // Failures are already logged and counted; the lines stay queued for the next tick.
                            let _ = transport.flush();
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                debug!(category = %transport.category, "Flush thread stopped.");
            })?;

        *worker = Some(Worker { shutdown_tx, handle });
        Ok(())
    }

    /// Stops the flush thread, flushes any queued lines and closes the connection.
    ///
    /// Closing is terminal: subsequent sends and connects fail with [`SendError::Closed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.stop();
        }

        let mut client = self.client.lock();
        // Failures were already logged by `write_pending`.
        let _ = self.write_pending(&mut client);
        *client = None;
        self.connected.store(false, Ordering::Release);

        let dropped = self.pending_len();
        debug!(category = %self.category, dropped, "Transport closed.");
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        thread,
        time::{Duration, Instant},
    };

    use bytes::Bytes;

    use super::Transport;
    use crate::{
        category::Category,
        error::SendError,
        transport::{test_util::MemoryDialer, TransportConfiguration},
    };

    fn config(flush_interval: Duration) -> TransportConfiguration {
        TransportConfiguration {
            flush_interval,
            connect_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(1),
        }
    }

    fn transport(dialer: &MemoryDialer) -> Arc<Transport> {
        Arc::new(Transport::new(Category::Metric, config(Duration::from_secs(3600)), Box::new(dialer.clone())))
    }

    #[test]
    fn connect_is_lazy_and_idempotent() {
        let dialer = MemoryDialer::new();
        let transport = transport(&dialer);
        transport.start().unwrap();

        assert_eq!(dialer.dials(), 0);
        assert!(!transport.is_connected());

        transport.connect().unwrap();
        transport.connect().unwrap();
        assert_eq!(dialer.dials(), 1);
        assert!(transport.is_connected());

        transport.close();
    }

    #[test]
    fn failed_connect_leaves_transport_disconnected() {
        let dialer = MemoryDialer::new();
        dialer.fail_connects(1);
        let transport = transport(&dialer);

        assert!(matches!(transport.connect(), Err(SendError::Connect { .. })));
        assert!(!transport.is_connected());

        transport.connect().unwrap();
        assert!(transport.is_connected());
    }

    #[test]
    fn flush_preserves_fifo_order() {
        let dialer = MemoryDialer::new();
        let transport = transport(&dialer);
        transport.connect().unwrap();

        for line in ["a 1\n", "b 2\n", "c 3\n", "d 4\n"] {
            transport.send(Bytes::from_static(line.as_bytes())).unwrap();
        }
        assert_eq!(transport.pending_len(), 4);
        assert_eq!(dialer.wire(), "");

        transport.flush().unwrap();
        assert_eq!(dialer.wire(), "a 1\nb 2\nc 3\nd 4\n");
        assert_eq!(transport.pending_len(), 0);
    }

    #[test]
    fn failed_lines_stay_queued_in_order() {
        let dialer = MemoryDialer::new();
        let transport = transport(&dialer);
        transport.connect().unwrap();

        transport.send(Bytes::from_static(b"a\n")).unwrap();
        transport.flush().unwrap();

        dialer.fail_writes(1);
        transport.send(Bytes::from_static(b"b\n")).unwrap();
        transport.send(Bytes::from_static(b"c\n")).unwrap();
        assert!(transport.flush().is_err());
        assert_eq!(transport.failure_count(), 1);
        assert!(!transport.is_connected());
        assert_eq!(transport.pending_len(), 2);

        // Lines buffered after the failure queue up behind the ones that failed.
        transport.send(Bytes::from_static(b"d\n")).unwrap();
        transport.flush().unwrap();
        assert!(transport.is_connected());
        assert_eq!(dialer.lines(), vec!["a", "b", "c", "d"]);
        assert_eq!(dialer.dials(), 2);
        assert_eq!(transport.failure_count(), 1);
    }

    #[test]
    fn failed_reconnect_counts_as_failure() {
        let dialer = MemoryDialer::new();
        let transport = transport(&dialer);
        transport.connect().unwrap();

        dialer.fail_writes(1);
        transport.send(Bytes::from_static(b"a\n")).unwrap();
        assert!(transport.flush().is_err());

        dialer.fail_connects(1);
        assert!(transport.flush().is_err());
        assert_eq!(transport.failure_count(), 2);
        assert_eq!(transport.pending_len(), 1);

        transport.flush().unwrap();
        assert_eq!(dialer.lines(), vec!["a"]);
    }

    #[test]
    fn empty_flush_does_not_dial() {
        let dialer = MemoryDialer::new();
        let transport = transport(&dialer);
        transport.flush().unwrap();
        assert_eq!(dialer.dials(), 0);
    }

    #[test]
    fn background_thread_flushes() {
        let dialer = MemoryDialer::new();
        let transport =
            Arc::new(Transport::new(Category::Event, config(Duration::from_millis(10)), Box::new(dialer.clone())));
        transport.start().unwrap();
        transport.start().unwrap();
        transport.connect().unwrap();
        transport.send(Bytes::from_static(b"tick\n")).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while dialer.wire().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(dialer.wire(), "tick\n");

        transport.close();
    }

    #[test]
    fn close_flushes_and_is_terminal() {
        let dialer = MemoryDialer::new();
        let transport = transport(&dialer);
        transport.start().unwrap();
        transport.connect().unwrap();
        transport.send(Bytes::from_static(b"last\n")).unwrap();

        transport.close();
        transport.close();

        assert_eq!(dialer.wire(), "last\n");
        assert!(!transport.is_connected());
        assert!(matches!(transport.send(Bytes::from_static(b"x\n")), Err(SendError::Closed)));
        assert!(matches!(transport.connect(), Err(SendError::Closed)));
        transport.start().unwrap();
    }

    #[test]
    fn flush_after_failed_close_does_not_reconnect() {
        let dialer = MemoryDialer::new();
        let transport = transport(&dialer);
        transport.connect().unwrap();
        transport.send(Bytes::from_static(b"m 1\n")).unwrap();

        dialer.fail_writes(1);
        transport.close();
        assert_eq!(transport.failure_count(), 1);
        assert_eq!(transport.pending_len(), 1);
        assert_eq!(dialer.dials(), 1);

        transport.flush().unwrap();
        assert_eq!(dialer.dials(), 1);
        assert_eq!(dialer.wire(), "");
        assert!(!transport.is_connected());
    }
}
