use russh::client::Handler;
use russh::keys::PublicKeyBase64;
use tracing::{info, warn};

/// Client-side handler; verifies the server key against an optional
/// whitelist.
pub(crate) struct Client {
    pub host: String,
    pub allowed_fingerprints: Option<Vec<String>>, // OpenSSH SHA256 or raw base64 keys
}

impl Handler for Client {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fp_sha256 = server_public_key
            .fingerprint(russh::keys::HashAlg::Sha256)
            .to_string();
        match &self.allowed_fingerprints {
            Some(allowed) => {
                let key_b64 = server_public_key.public_key_base64();
                let ok = allowed.iter().any(|s| s == &fp_sha256 || s == &key_b64);
                if !ok {
                    warn!("{} presented unknown host key {}", self.host, fp_sha256);
                }
                Ok(ok)
            }
            None => {
                info!("accepting host key {} for {} (no whitelist)", fp_sha256, self.host);
                Ok(true)
            }
        }
    }
}
