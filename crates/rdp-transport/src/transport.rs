use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::instrument;
use x509_cert::der::Decode;

use crate::buffer_pool::{BufferPool, OutputStream};
use crate::error::{io_err, TransportError, TransportErrorKind, TransportResult};
use crate::stream::Stream;
use crate::ui_poll::{NeverQuit, PollOutcome, UiPoll};

const DEFAULT_RDP_PORT: u16 = 3389;
const MIN_RECV_BUFFER: usize = 16 * 1024;
const SEND_RETRY_WAIT: Duration = Duration::from_millis(100);
/// Read timeout used internally so `recv`'s blocking loop can periodically
/// hand control back to the UI-poll hook without holding the tcp lock.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const RSA_ENCRYPTION_OID: &str = "1.2.840.113549.1.1.1";

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub port: u16,
    pub smartcard_sharing: bool,
    pub ui_poll_enabled: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_RDP_PORT,
            smartcard_sharing: false,
            ui_poll_enabled: true,
        }
    }
}

struct Inner {
    stream: Option<Stream>,
    pool: BufferPool,
}

/// Byte-stream transport to one RDP server: a TCP socket with an optional
/// TLS overlay, a rotating output-buffer pool, and sticky error flags.
///
/// The pool and every send/receive is guarded by a single mutex (the "tcp
/// lock"), held only around the transport primitive itself so a blocked
/// `recv` never holds it while polling the UI hook.
pub struct Transport {
    inner: Mutex<Inner>,
    /// Dedicated buffer for `recv`'s no-caller-buffer case. Never contended
    /// by the smartcard subsystem, so it is guarded by its own mutex instead
    /// of going through the tcp lock on `inner`.
    input: Mutex<rdp_core::StreamBuffer>,
    ui_poll: Mutex<Box<dyn UiPoll>>,
    config: TransportConfig,
    server_name: Mutex<Option<String>>,
    resolved_addr: Mutex<Option<SocketAddr>>,
    network_error: AtomicBool,
    user_quit: AtomicBool,
}

impl Transport {
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                stream: None,
                pool: BufferPool::new(config.smartcard_sharing),
            }),
            input: Mutex::new(rdp_core::StreamBuffer::init(MIN_RECV_BUFFER)),
            ui_poll: Mutex::new(Box::new(NeverQuit)),
            config,
            server_name: Mutex::new(None),
            resolved_addr: Mutex::new(None),
            network_error: AtomicBool::new(false),
            user_quit: AtomicBool::new(false),
        }
    }

    pub fn set_ui_poll(&self, hook: Box<dyn UiPoll>) {
        *self.ui_poll.lock().unwrap() = hook;
    }

    #[must_use]
    pub fn is_network_error(&self) -> bool {
        self.network_error.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_user_quit(&self) -> bool {
        self.user_quit.load(Ordering::SeqCst)
    }

    fn check_sticky_flags(&self, context: &'static str) -> TransportResult<()> {
        if self.user_quit.load(Ordering::SeqCst) {
            return Err(TransportError::new(context, TransportErrorKind::UserQuit));
        }
        if self.network_error.load(Ordering::SeqCst) {
            return Err(TransportError::new(context, TransportErrorKind::NetworkError));
        }
        Ok(())
    }

    /// Resolves `server_name` (reusing the cached address when reconnecting
    /// to the same name), connects, configures the socket, and allocates the
    /// stream-buffer pool.
    #[instrument(skip(self), fields(server_name))]
    pub fn connect(&self, server_name: &str) -> TransportResult<()> {
        self.check_sticky_flags("connect")?;

        let mut resolved_guard = self.resolved_addr.lock().unwrap();
        let mut server_name_guard = self.server_name.lock().unwrap();

        let addr = if server_name_guard.as_deref() == Some(server_name) {
            resolved_guard.ok_or_else(|| io_err("connect", std::io::Error::other("no cached address")))?
        } else {
            let addr = (server_name, self.config.port)
                .to_socket_addrs()
                .map_err(|e| io_err("connect", e))?
                .next()
                .ok_or_else(|| io_err("connect", std::io::Error::other("no addresses resolved")))?;
            *resolved_guard = Some(addr);
            *server_name_guard = Some(server_name.to_owned());
            addr
        };

        let tcp = TcpStream::connect(addr).map_err(|e| io_err("connect", e))?;
        tcp.set_nodelay(true).map_err(|e| io_err("connect", e))?;
        tcp.set_read_timeout(Some(POLL_INTERVAL)).map_err(|e| io_err("connect", e))?;
        ensure_recv_buffer(&tcp);

        let mut inner = self.inner.lock().unwrap();
        inner.stream = Some(Stream::Plain(tcp));
        inner.pool.reset_all();
        drop(inner);
        self.input.lock().unwrap().reset();

        Ok(())
    }

    /// Performs a TLS client handshake over the existing socket. On failure
    /// the TCP socket is left intact so the caller may fall back.
    #[instrument(skip(self))]
    pub fn tls_upgrade(&self, server_name: &str) -> TransportResult<()> {
        self.check_sticky_flags("tls_upgrade")?;

        let mut inner = self.inner.lock().unwrap();
        let plain = match inner.stream.take() {
            Some(Stream::Plain(tcp)) => tcp,
            Some(other) => {
                inner.stream = Some(other);
                return Ok(()); // already upgraded
            }
            None => return Err(io_err("tls_upgrade", std::io::Error::other("not connected"))),
        };

        // `native_tls`'s handshake error variants don't hand the stream back,
        // so keep a duplicate descriptor to restore on any failure path.
        let fallback = plain.try_clone().map_err(|e| io_err("tls_upgrade", e))?;

        let connector = match native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .use_sni(false)
            .build()
        {
            Ok(connector) => connector,
            Err(e) => {
                inner.stream = Some(Stream::Plain(fallback));
                return Err(TransportError::new("tls_upgrade", TransportErrorKind::Tls(e)));
            }
        };

        match connector.connect(server_name, plain) {
            Ok(tls) => {
                inner.stream = Some(Stream::Tls(Box::new(tls)));
                Ok(())
            }
            Err(native_tls::HandshakeError::Failure(e)) => {
                inner.stream = Some(Stream::Plain(fallback));
                Err(TransportError::new("tls_upgrade", TransportErrorKind::Tls(e)))
            }
            Err(native_tls::HandshakeError::WouldBlock(mut mid)) => loop {
                match mid.handshake() {
                    Ok(tls) => {
                        inner.stream = Some(Stream::Tls(Box::new(tls)));
                        return Ok(());
                    }
                    Err(native_tls::HandshakeError::WouldBlock(next)) => mid = next,
                    Err(native_tls::HandshakeError::Failure(e)) => {
                        inner.stream = Some(Stream::Plain(fallback));
                        return Err(TransportError::new("tls_upgrade", TransportErrorKind::Tls(e)));
                    }
                }
            },
        }
    }

    /// Extracts the peer certificate's RSA public key as PKCS#1 DER, for the
    /// external CredSSP component's server-authentication binding.
    pub fn tls_peer_pubkey(&self) -> TransportResult<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let tls = match inner.stream.as_ref() {
            Some(Stream::Tls(tls)) => tls,
            _ => return Err(TransportError::new("tls_peer_pubkey", TransportErrorKind::NoPeerCertificate)),
        };

        let cert = tls
            .peer_certificate()
            .map_err(|e| TransportError::new("tls_peer_pubkey", TransportErrorKind::Tls(e)))?
            .ok_or_else(|| TransportError::new("tls_peer_pubkey", TransportErrorKind::NoPeerCertificate))?;
        let der = cert
            .to_der()
            .map_err(|e| TransportError::new("tls_peer_pubkey", TransportErrorKind::Tls(e)))?;

        let parsed = x509_cert::Certificate::from_der(&der)
            .map_err(|_| TransportError::new("tls_peer_pubkey", TransportErrorKind::NonRsaPeerKey))?;
        let spki = &parsed.tbs_certificate.subject_public_key_info;
        if spki.algorithm.oid.to_string() != RSA_ENCRYPTION_OID {
            return Err(TransportError::new("tls_peer_pubkey", TransportErrorKind::NonRsaPeerKey));
        }
        let key_bytes = spki
            .subject_public_key
            .as_bytes()
            .ok_or_else(|| TransportError::new("tls_peer_pubkey", TransportErrorKind::NonRsaPeerKey))?;

        Ok(key_bytes.to_vec())
    }

    /// Checks an output buffer out of the pool, grown to at least `capacity`.
    pub fn init_stream(&self, capacity: usize) -> OutputStream {
        let mut inner = self.inner.lock().unwrap();
        inner.pool.checkout(capacity)
    }

    /// Writes `stream.data()` in full, retrying on would-block with a bounded
    /// wait, then returns the buffer to the pool.
    #[instrument(skip(self, stream))]
    pub fn send(&self, mut stream: OutputStream) -> TransportResult<()> {
        self.check_sticky_flags("send")?;

        let mut inner = self.inner.lock().unwrap();
        let Some(conn) = inner.stream.as_mut() else {
            return Err(io_err("send", std::io::Error::other("not connected")));
        };

        let mut written = 0usize;
        let payload = stream.buffer.data().to_vec();
        while written < payload.len() {
            match conn.write(&payload[written..]) {
                Ok(0) => {
                    self.network_error.store(true, Ordering::SeqCst);
                    return Err(io_err("send", std::io::Error::new(ErrorKind::WriteZero, "peer closed")));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(SEND_RETRY_WAIT);
                }
                Err(e) => {
                    self.network_error.store(true, Ordering::SeqCst);
                    return Err(io_err("send", e));
                }
            }
        }

        inner.pool.release(stream);
        Ok(())
    }

    /// Reads exactly `length` bytes, using the dedicated input buffer when
    /// `stream` is `None`, otherwise appending into the given buffer.
    ///
    /// Blocks, cooperatively polling the UI hook between retries, until the
    /// data arrives, the peer closes (graceful `Ok(None)`), the user quits
    /// (`Ok(None)` with `user_quit` set), or a fatal I/O error occurs.
    #[instrument(skip(self, stream))]
    pub fn recv(&self, stream: Option<&mut rdp_core::StreamBuffer>, length: usize) -> TransportResult<Option<()>> {
        self.check_sticky_flags("recv")?;

        let mut owned_input;
        let buf: &mut rdp_core::StreamBuffer = match stream {
            Some(s) => s,
            None => {
                owned_input = self.input.lock().unwrap();
                &mut *owned_input
            }
        };

        let start_end = buf.end();
        if buf.raw_mut().len() < start_end + length {
            buf.raw_mut().resize(start_end + length, 0);
        }

        let mut total_read = 0usize;
        let result = loop {
            if self.user_quit.load(Ordering::SeqCst) {
                break Ok(None);
            }

            let read_outcome = {
                let mut inner = self.inner.lock().unwrap();
                let Some(conn) = inner.stream.as_mut() else {
                    break Err(io_err("recv", std::io::Error::other("not connected")));
                };
                let dst = &mut buf.raw_mut()[start_end + total_read..start_end + length];
                conn.read(dst)
            };

            match read_outcome {
                Ok(0) => break Ok(None),
                Ok(n) => {
                    total_read += n;
                    if total_read >= length {
                        buf.set_end(start_end + length);
                        break Ok(Some(()));
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    if self.config.ui_poll_enabled {
                        let tcp_ref = {
                            let inner = self.inner.lock().unwrap();
                            inner.stream.as_ref().map(Stream::tcp).and_then(|t| t.try_clone().ok())
                        };
                        if let Some(tcp_ref) = tcp_ref {
                            let outcome = self.ui_poll.lock().unwrap().on_idle(&tcp_ref);
                            if outcome == PollOutcome::UserQuit {
                                self.user_quit.store(true, Ordering::SeqCst);
                                break Ok(None);
                            }
                        }
                    }
                }
                Err(e) => {
                    self.network_error.store(true, Ordering::SeqCst);
                    break Err(io_err("recv", e));
                }
            }
        };

        result
    }

    /// Reads exactly `length` bytes using the dedicated input buffer and
    /// returns a copy of them, or `None` on graceful close / user quit.
    ///
    /// A convenience wrapper around [`Self::recv`]'s `stream: None` case for
    /// callers (the ISO framer) that just want the bytes rather than direct
    /// access to the underlying buffer.
    pub fn recv_into_input(&self, length: usize) -> TransportResult<Option<Vec<u8>>> {
        let Some(()) = self.recv(None, length)? else {
            return Ok(None);
        };

        let mut input = self.input.lock().unwrap();
        let bytes = input.reader().read_slice(length).to_vec();
        input.advance_read(length);
        if input.remaining() == 0 {
            input.reset();
        }
        Ok(Some(bytes))
    }

    /// If TLS was established, sends close-notify and frees TLS state; then
    /// closes the socket.
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(Stream::Tls(mut tls)) = inner.stream.take() {
            let _ = tls.shutdown();
        }
        inner.stream = None;
    }

    /// Zeros and resets every stream buffer; used before a reconnect.
    pub fn reset_state(&self) {
        self.network_error.store(false, Ordering::SeqCst);
        self.user_quit.store(false, Ordering::SeqCst);
        self.inner.lock().unwrap().pool.reset_all();
        self.input.lock().unwrap().reset();
    }

    #[must_use]
    pub fn get_local_address(&self) -> String {
        self.inner
            .lock()
            .unwrap()
            .stream
            .as_ref()
            .and_then(|s| s.tcp().local_addr().ok())
            .map(|a| a.ip().to_string())
            .unwrap_or_else(|| "0.0.0.0".to_owned())
    }

    #[must_use]
    pub fn get_peer_address(&self) -> String {
        self.inner
            .lock()
            .unwrap()
            .stream
            .as_ref()
            .and_then(|s| s.tcp().peer_addr().ok())
            .map(|a| a.ip().to_string())
            .unwrap_or_else(|| "127.0.0.1".to_owned())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner
            .lock()
            .unwrap()
            .stream
            .as_ref()
            .is_some_and(|s| s.tcp().peer_addr().is_ok())
    }
}

fn ensure_recv_buffer(tcp: &TcpStream) {
    let socket = socket2::SockRef::from(tcp);
    if let Ok(current) = socket.recv_buffer_size() {
        if current < MIN_RECV_BUFFER {
            let _ = socket.set_recv_buffer_size(MIN_RECV_BUFFER);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sticky_flags_short_circuit_until_reset() {
        let transport = Transport::new(TransportConfig::default());
        assert!(!transport.is_network_error());
        assert!(!transport.is_user_quit());

        transport.user_quit.store(true, Ordering::SeqCst);
        assert!(matches!(
            transport.check_sticky_flags("test"),
            Err(e) if matches!(e.kind(), TransportErrorKind::UserQuit)
        ));

        transport.reset_state();
        assert!(!transport.is_user_quit());
        assert!(transport.check_sticky_flags("test").is_ok());
    }

    #[test]
    fn network_error_takes_priority_when_both_flags_set() {
        let transport = Transport::new(TransportConfig::default());
        transport.user_quit.store(true, Ordering::SeqCst);
        transport.network_error.store(true, Ordering::SeqCst);

        assert!(matches!(
            transport.check_sticky_flags("test"),
            Err(e) if matches!(e.kind(), TransportErrorKind::UserQuit)
        ));
    }

    #[test]
    fn init_stream_rotates_through_smartcard_slots() {
        let transport = Transport::new(TransportConfig {
            smartcard_sharing: true,
            ..TransportConfig::default()
        });

        let first = transport.init_stream(64);
        let second = transport.init_stream(64);
        assert_ne!(first.slot, second.slot);

        transport.inner.lock().unwrap().pool.release(first);
        transport.inner.lock().unwrap().pool.release(second);
    }

    #[test]
    fn disconnected_transport_reports_placeholder_addresses() {
        let transport = Transport::new(TransportConfig::default());
        assert!(!transport.is_connected());
        assert_eq!(transport.get_local_address(), "0.0.0.0");
        assert_eq!(transport.get_peer_address(), "127.0.0.1");
    }

    #[test]
    fn recv_without_a_connection_reports_io_error() {
        let transport = Transport::new(TransportConfig::default());
        let err = transport.recv(None, 4).unwrap_err();
        assert!(matches!(err.kind(), TransportErrorKind::Io(_)));
    }
}
