//! TLS client for the Deluge daemon.
//!
//! Daemons generate a self-signed certificate on first start, so the
//! certificate chain is accepted as presented. Handshake signatures are
//! still checked against the certificate's key.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;

use crate::driver::DriverError;

#[derive(Debug)]
struct SelfSignedDaemonVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for SelfSignedDaemonVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Builds a connector trusting whatever certificate the daemon presents.
///
/// # Errors
///
/// - `DriverError::Tls` - If the crypto provider rejects the protocol versions
pub(crate) fn daemon_connector() -> Result<TlsConnector, DriverError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = Arc::new(SelfSignedDaemonVerifier {
        algorithms: provider.signature_verification_algorithms,
    });

    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| DriverError::Tls {
            reason: format!("Unsupported protocol versions: {e}"),
        })?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Parses `host` into the name sent during the handshake.
///
/// # Errors
///
/// - `DriverError::Tls` - If `host` is neither a DNS name nor an IP address
pub(crate) fn server_name(host: &str) -> Result<ServerName<'static>, DriverError> {
    ServerName::try_from(host.to_string()).map_err(|e| DriverError::Tls {
        reason: format!("Invalid server name '{host}': {e}"),
    })
}
