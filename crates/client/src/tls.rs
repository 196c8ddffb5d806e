//! Mutual TLS for upstream connections

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::config::NativeClientConfig;
use crate::error::{ClientError, Result};

/// Build a connector from the three PEM paths
///
/// Returns `None` when all paths are empty. Any configured path that points
/// at a missing or zero-byte file is rejected before dialing.
pub fn load_connector(config: &NativeClientConfig) -> Result<Option<TlsConnector>> {
    if !config.tls_enabled() {
        return Ok(None);
    }

    let ca_pem = read_pem(&config.ca_pem_path)?;
    let mut roots = RootCertStore::empty();
    for cert in parse_certificates(&config.ca_pem_path, &ca_pem)? {
        roots
            .add(cert)
            .map_err(|e| ClientError::tls(&config.ca_pem_path, format!("bad CA certificate: {e}")))?;
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ClientError::tls(&config.ca_pem_path, e.to_string()))?
        .with_root_certificates(roots);

    let both_empty =
        config.client_pem_path.as_os_str().is_empty() && config.client_key_path.as_os_str().is_empty();
    let client_config = if both_empty {
        builder.with_no_client_auth()
    } else {
        let cert_pem = read_pem(&config.client_pem_path)?;
        let key_pem = read_pem(&config.client_key_path)?;
        let certs = parse_certificates(&config.client_pem_path, &cert_pem)?;
        let key = PrivateKeyDer::from_pem_slice(&key_pem).map_err(|e| {
            ClientError::tls(&config.client_key_path, format!("bad private key: {e}"))
        })?;
        builder
            .with_client_auth_cert(certs, key)
            .map_err(|e| ClientError::tls(&config.client_pem_path, e.to_string()))?
    };

    Ok(Some(TlsConnector::from(Arc::new(client_config))))
}

/// Server name for the handshake: explicit override or the host of `addr`
pub fn server_name(addr: &str, override_name: Option<&str>) -> Result<ServerName<'static>> {
    let host = override_name.unwrap_or_else(|| host_of(addr));
    ServerName::try_from(host.to_owned())
        .map_err(|e| ClientError::InvalidConfig(format!("invalid tls server name {host}: {e}")))
}

fn host_of(addr: &str) -> &str {
    let host = addr.rsplit_once(':').map_or(addr, |(host, _)| host);
    host.trim_start_matches('[').trim_end_matches(']')
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str().is_empty() {
        return Err(ClientError::tls(path, "path is required when tls is enabled"));
    }
    let bytes = fs::read(path).map_err(|e| ClientError::tls(path, e.to_string()))?;
    if bytes.is_empty() {
        return Err(ClientError::tls(path, "file is empty"));
    }
    Ok(bytes)
}

fn parse_certificates(path: &Path, pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_slice_iter(pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ClientError::tls(path, format!("failed to parse certificates: {e}")))?;
    if certs.is_empty() {
        return Err(ClientError::tls(path, "no certificates found"));
    }
    Ok(certs)
}
