use crate::error::{ServerError, ServerResult};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// PEM certificate chain and private key for serving HTTPS.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    cert_file: PathBuf,
    key_file: PathBuf,
}

impl TlsConfig {
    pub fn new<P: AsRef<Path>>(cert_file: P, key_file: P) -> Self {
        Self {
            cert_file: cert_file.as_ref().to_path_buf(),
            key_file: key_file.as_ref().to_path_buf(),
        }
    }

    fn load_certs(&self) -> ServerResult<Vec<CertificateDer<'static>>> {
        let mut reader = BufReader::new(File::open(&self.cert_file)?);
        let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
        if certs.is_empty() {
            return Err(ServerError::Tls(format!(
                "no certificates found in {}",
                self.cert_file.display()
            )));
        }
        Ok(certs)
    }

    fn load_key(&self) -> ServerResult<PrivateKeyDer<'static>> {
        let mut reader = BufReader::new(File::open(&self.key_file)?);
        rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| {
            ServerError::Tls(format!("no private key found in {}", self.key_file.display()))
        })
    }

    pub(crate) fn acceptor(&self) -> ServerResult<TlsAcceptor> {
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(self.load_certs()?, self.load_key()?)
            .map_err(|e| ServerError::Tls(e.to_string()))?;
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}
