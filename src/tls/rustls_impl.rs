use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerConfig, ServerConnection};
use thiserror::Error as ThisError;

use super::engine::{EngineResult, HandshakeStatus, Status, TlsEngine};
use crate::error::{self, Error};

/// Largest TLS record on the wire: 16 KiB plaintext plus header, padding
/// and authentication tag.
const MAX_RECORD_SIZE: usize = 16 * 1024 + 2048;

/// Largest plaintext fragment rustls puts in one record.
const MAX_PLAINTEXT: usize = 16 * 1024;

/// Failures setting up TLS: loading PEM material or building configs.
#[derive(Debug, ThisError)]
pub enum TlsError {
    #[error("TLS I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("TLS configuration error: {0}")]
    Configuration(String),
    #[error("no certificates found in file")]
    NoCertificatesFound,
    #[error("no private key found in file")]
    NoPrivateKeyFound,
    #[error("invalid DNS name: {0}")]
    InvalidDnsName(String),
}

impl From<TlsError> for Error {
    fn from(err: TlsError) -> Self {
        Error::Tls(err.to_string())
    }
}

enum TlsConnection {
    Client(ClientConnection),
    Server(ServerConnection),
}

impl TlsConnection {
    fn is_handshaking(&self) -> bool {
        match self {
            Self::Client(c) => c.is_handshaking(),
            Self::Server(s) => s.is_handshaking(),
        }
    }

    fn wants_write(&self) -> bool {
        match self {
            Self::Client(c) => c.wants_write(),
            Self::Server(s) => s.wants_write(),
        }
    }

    fn reader(&mut self) -> rustls::Reader<'_> {
        match self {
            Self::Client(c) => c.reader(),
            Self::Server(s) => s.reader(),
        }
    }

    fn writer(&mut self) -> rustls::Writer<'_> {
        match self {
            Self::Client(c) => c.writer(),
            Self::Server(s) => s.writer(),
        }
    }

    fn read_tls(&mut self, rd: &mut dyn io::Read) -> io::Result<usize> {
        match self {
            Self::Client(c) => c.read_tls(rd),
            Self::Server(s) => s.read_tls(rd),
        }
    }

    fn write_tls(&mut self, wr: &mut dyn io::Write) -> io::Result<usize> {
        match self {
            Self::Client(c) => c.write_tls(wr),
            Self::Server(s) => s.write_tls(wr),
        }
    }

    fn process_new_packets(&mut self) -> Result<rustls::IoState, rustls::Error> {
        match self {
            Self::Client(c) => c.process_new_packets(),
            Self::Server(s) => s.process_new_packets(),
        }
    }

    fn send_close_notify(&mut self) {
        match self {
            Self::Client(c) => c.send_close_notify(),
            Self::Server(s) => s.send_close_notify(),
        }
    }

    fn alpn_protocol(&self) -> Option<&[u8]> {
        match self {
            Self::Client(c) => c.alpn_protocol(),
            Self::Server(s) => s.alpn_protocol(),
        }
    }
}

/// [`TlsEngine`] over rustls' buffer-based connection API.
///
/// rustls never hands out delegated tasks, so this engine never reports
/// `NeedTask`.
pub struct RustlsEngine {
    conn: TlsConnection,
    outbound_closed: bool,
    inbound_done: bool,
    finished_reported: bool,
}

impl RustlsEngine {
    /// Client engine that will verify the server as `server_name`.
    ///
    /// # Errors
    ///
    /// `TlsError::InvalidDnsName` for an unusable name,
    /// `TlsError::Configuration` if rustls rejects the config.
    pub fn client(config: Arc<ClientConfig>, server_name: &str) -> Result<Self, TlsError> {
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| TlsError::InvalidDnsName(server_name.to_string()))?;
        let conn = ClientConnection::new(config, name)
            .map_err(|e| TlsError::Configuration(e.to_string()))?;
        Ok(Self::with_connection(TlsConnection::Client(conn)))
    }

    /// Server engine.
    ///
    /// # Errors
    ///
    /// `TlsError::Configuration` if rustls rejects the config.
    pub fn server(config: Arc<ServerConfig>) -> Result<Self, TlsError> {
        let conn =
            ServerConnection::new(config).map_err(|e| TlsError::Configuration(e.to_string()))?;
        Ok(Self::with_connection(TlsConnection::Server(conn)))
    }

    fn with_connection(conn: TlsConnection) -> Self {
        Self {
            conn,
            outbound_closed: false,
            inbound_done: false,
            finished_reported: false,
        }
    }

    /// ALPN protocol agreed during the handshake.
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.conn.alpn_protocol()
    }

    fn current_status(&self) -> HandshakeStatus {
        if self.conn.wants_write() {
            HandshakeStatus::NeedWrap
        } else if self.conn.is_handshaking() {
            HandshakeStatus::NeedUnwrap
        } else {
            HandshakeStatus::NotHandshaking
        }
    }

    /// Build a result, reporting `Finished` on the first call that sees
    /// the handshake complete.
    fn result(&mut self, status: Status, consumed: usize, produced: usize) -> EngineResult {
        let mut handshake = self.current_status();
        if handshake == HandshakeStatus::NotHandshaking && !self.finished_reported {
            self.finished_reported = true;
            handshake = HandshakeStatus::Finished;
        }
        EngineResult::new(status, handshake, consumed, produced)
    }
}

fn tls_error(err: impl std::fmt::Display) -> Error {
    Error::Tls(err.to_string())
}

impl TlsEngine for RustlsEngine {
    fn wrap(&mut self, src: &[u8], dst: &mut [u8]) -> error::Result<EngineResult> {
        if dst.is_empty() {
            return Ok(self.result(Status::BufferOverflow, 0, 0));
        }

        // Plaintext is only taken once earlier records are out, so rustls'
        // internal buffer stays at one record.
        let mut consumed = 0;
        if !src.is_empty()
            && !self.outbound_closed
            && !self.conn.is_handshaking()
            && !self.conn.wants_write()
        {
            let chunk = &src[..src.len().min(MAX_PLAINTEXT)];
            consumed = self.conn.writer().write(chunk).map_err(tls_error)?;
        }

        let mut produced = 0;
        while self.conn.wants_write() && produced < dst.len() {
            let mut out = &mut dst[produced..];
            let n = self.conn.write_tls(&mut out).map_err(tls_error)?;
            if n == 0 {
                break;
            }
            produced += n;
        }

        let status = if self.outbound_closed {
            Status::Closed
        } else {
            Status::Ok
        };
        Ok(self.result(status, consumed, produced))
    }

    fn unwrap(&mut self, src: &[u8], dst: &mut [u8]) -> error::Result<EngineResult> {
        let mut consumed = 0;
        if !src.is_empty() {
            let mut input = src;
            consumed = self.conn.read_tls(&mut input).map_err(tls_error)?;
        }
        let state = self.conn.process_new_packets().map_err(tls_error)?;

        if dst.is_empty() && state.plaintext_bytes_to_read() > 0 {
            return Ok(self.result(Status::BufferOverflow, consumed, 0));
        }

        let produced = match self.conn.reader().read(dst) {
            Ok(0) if !dst.is_empty() => {
                self.inbound_done = true;
                0
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => return Err(tls_error(e)),
        };

        let status = if produced == 0 && self.inbound_done {
            Status::Closed
        } else if produced == 0 && consumed == 0 {
            Status::BufferUnderflow
        } else {
            Status::Ok
        };
        Ok(self.result(status, consumed, produced))
    }

    fn handshake_status(&self) -> HandshakeStatus {
        self.current_status()
    }

    fn close_outbound(&mut self) {
        if !self.outbound_closed {
            self.conn.send_close_notify();
            self.outbound_closed = true;
        }
    }

    fn is_outbound_done(&self) -> bool {
        self.outbound_closed && !self.conn.wants_write()
    }

    fn is_inbound_done(&self) -> bool {
        self.inbound_done
    }

    fn packet_buffer_size(&self) -> usize {
        MAX_RECORD_SIZE
    }

    fn application_buffer_size(&self) -> usize {
        MAX_PLAINTEXT
    }
}

/// Client config trusting the Mozilla root set shipped by `webpki-roots`.
#[must_use]
pub fn client_config_with_webpki_roots() -> Arc<ClientConfig> {
    let root_store = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Arc::new(config)
}

/// Client config trusting only `roots`.
///
/// # Errors
///
/// `TlsError::Configuration` if a certificate cannot be parsed.
pub fn client_config_with_roots(
    roots: impl IntoIterator<Item = CertificateDer<'static>>,
) -> Result<Arc<ClientConfig>, TlsError> {
    let mut root_store = RootCertStore::empty();
    for cert in roots {
        root_store
            .add(cert)
            .map_err(|e| TlsError::Configuration(e.to_string()))?;
    }
    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Server config presenting `cert_chain`, without client authentication.
///
/// # Errors
///
/// `TlsError::Configuration` if the key does not match the certificate.
pub fn server_config(
    cert_chain: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
) -> Result<Arc<ServerConfig>, TlsError> {
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)
        .map_err(|e| TlsError::Configuration(e.to_string()))?;
    Ok(Arc::new(config))
}

/// Load every certificate from a PEM file.
///
/// # Errors
///
/// `TlsError::Io` if the file cannot be read,
/// `TlsError::NoCertificatesFound` if it holds none.
pub fn load_certs_from_file(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificatesFound);
    }
    Ok(certs)
}

/// Load the first PKCS#1, PKCS#8 or SEC1 private key from a PEM file.
///
/// # Errors
///
/// `TlsError::Io` if the file cannot be read,
/// `TlsError::NoPrivateKeyFound` if it holds no key.
pub fn load_private_key_from_file(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = BufReader::new(File::open(path)?);
    for item in rustls_pemfile::read_all(&mut reader) {
        match item? {
            rustls_pemfile::Item::Pkcs1Key(key) => return Ok(PrivateKeyDer::Pkcs1(key)),
            rustls_pemfile::Item::Pkcs8Key(key) => return Ok(PrivateKeyDer::Pkcs8(key)),
            rustls_pemfile::Item::Sec1Key(key) => return Ok(PrivateKeyDer::Sec1(key)),
            _ => {}
        }
    }
    Err(TlsError::NoPrivateKeyFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn self_signed() -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let key = PrivateKeyDer::Pkcs8(cert.key_pair.serialize_der().into());
        (cert.cert.der().clone(), key)
    }

    /// Move every pending record from one engine to the other.
    fn transfer(from: &mut RustlsEngine, to: &mut RustlsEngine, app: &mut Vec<u8>) {
        let mut net = vec![0u8; MAX_RECORD_SIZE];
        let mut plain = vec![0u8; MAX_PLAINTEXT];
        loop {
            let wrapped = from.wrap(&[], &mut net).unwrap();
            if wrapped.bytes_produced == 0 {
                break;
            }
            let mut offset = 0;
            while offset < wrapped.bytes_produced {
                let r = to.unwrap(&net[offset..wrapped.bytes_produced], &mut plain).unwrap();
                offset += r.bytes_consumed;
                app.extend_from_slice(&plain[..r.bytes_produced]);
                if r.bytes_consumed == 0 {
                    break;
                }
            }
        }
    }

    fn handshake_pair() -> (RustlsEngine, RustlsEngine) {
        let (cert, key) = self_signed();
        let client_config = client_config_with_roots([cert.clone()]).unwrap();
        let server_config = server_config(vec![cert], key).unwrap();
        let mut client = RustlsEngine::client(client_config, "localhost").unwrap();
        let mut server = RustlsEngine::server(server_config).unwrap();

        assert_eq!(client.handshake_status(), HandshakeStatus::NeedWrap);
        assert_eq!(server.handshake_status(), HandshakeStatus::NeedUnwrap);

        let mut ignored = Vec::new();
        for _ in 0..10 {
            transfer(&mut client, &mut server, &mut ignored);
            transfer(&mut server, &mut client, &mut ignored);
        }
        assert!(ignored.is_empty());
        (client, server)
    }

    #[test]
    fn test_engines_complete_handshake() {
        let (client, server) = handshake_pair();
        assert_eq!(client.handshake_status(), HandshakeStatus::NotHandshaking);
        assert_eq!(server.handshake_status(), HandshakeStatus::NotHandshaking);
    }

    #[test]
    fn test_engines_exchange_data_and_close() {
        let (mut client, mut server) = handshake_pair();
        let mut net = vec![0u8; MAX_RECORD_SIZE];
        let wrapped = client.wrap(b"hello", &mut net).unwrap();
        assert_eq!(wrapped.status, Status::Ok);
        assert_eq!(wrapped.bytes_consumed, 5);

        let mut plain = vec![0u8; 64];
        let unwrapped = server
            .unwrap(&net[..wrapped.bytes_produced], &mut plain)
            .unwrap();
        assert_eq!(&plain[..unwrapped.bytes_produced], b"hello");

        client.close_outbound();
        let mut app = Vec::new();
        transfer(&mut client, &mut server, &mut app);
        assert!(client.is_outbound_done());
        let closed = server.unwrap(&[], &mut plain).unwrap();
        assert_eq!(closed.status, Status::Closed);
        assert!(server.is_inbound_done());
    }

    #[test]
    fn test_unwrap_with_no_input_underflows() {
        let (_, mut server) = handshake_pair();
        let mut plain = vec![0u8; 64];
        let result = server.unwrap(&[], &mut plain).unwrap();
        assert_eq!(result.status, Status::BufferUnderflow);
    }

    #[test]
    fn test_wrap_into_empty_buffer_overflows() {
        let (cert, _) = self_signed();
        let config = client_config_with_roots([cert]).unwrap();
        let mut client = RustlsEngine::client(config, "localhost").unwrap();
        let result = client.wrap(&[], &mut []).unwrap();
        assert_eq!(result.status, Status::BufferOverflow);
    }

    #[test]
    fn test_garbage_records_fail() {
        let (_, mut server) = handshake_pair();
        let mut plain = vec![0u8; 64];
        assert!(matches!(
            server.unwrap(&[0xff; 32], &mut plain),
            Err(Error::Tls(_))
        ));
    }

    #[test]
    fn test_invalid_dns_name() {
        let config = client_config_with_webpki_roots();
        assert!(matches!(
            RustlsEngine::client(config, "not a valid name!"),
            Err(TlsError::InvalidDnsName(_))
        ));
    }

    #[test]
    fn test_tls_error_converts_to_error() {
        let err: Error = TlsError::NoCertificatesFound.into();
        assert_eq!(err, Error::Tls("no certificates found in file".into()));
    }

    #[test]
    fn test_load_certs_file_not_found() {
        let result = load_certs_from_file(Path::new("/nonexistent/path/cert.pem"));
        assert!(matches!(result, Err(TlsError::Io(_))));
    }

    #[test]
    fn test_load_certs_no_certs_in_file() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"not a certificate\njust some text\n").unwrap();
        temp.flush().unwrap();

        let result = load_certs_from_file(temp.path());
        assert!(matches!(result, Err(TlsError::NoCertificatesFound)));
    }

    #[test]
    fn test_load_pem_round_trip() {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let mut cert_file = NamedTempFile::new().unwrap();
        cert_file.write_all(cert.cert.pem().as_bytes()).unwrap();
        let mut key_file = NamedTempFile::new().unwrap();
        key_file
            .write_all(cert.key_pair.serialize_pem().as_bytes())
            .unwrap();

        let certs = load_certs_from_file(cert_file.path()).unwrap();
        assert_eq!(certs.len(), 1);
        let key = load_private_key_from_file(key_file.path()).unwrap();
        assert!(matches!(key, PrivateKeyDer::Pkcs8(_)));
    }

    #[test]
    fn test_load_private_key_no_key_in_file() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"not a private key\njust some text\n").unwrap();
        temp.flush().unwrap();

        let result = load_private_key_from_file(temp.path());
        assert!(matches!(result, Err(TlsError::NoPrivateKeyFound)));
    }
}
