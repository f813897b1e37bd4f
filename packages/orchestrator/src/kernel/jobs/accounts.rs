//! Platform account roster (spec.md §5: "There must be only one worker
//! per account by construction"). The account list is static
//! configuration, not a store-backed entity: accounts are onboarded out
//! of band and the roster is reloaded by restarting the process.

use anyhow::{Context, Result};
use serde::Deserialize;

use super::encryption::CredentialCodec;

#[derive(Debug, Deserialize)]
struct RawAccount {
    id: String,
    supported_kinds: Vec<String>,
    credential: String,
}

/// One platform account a [`super::worker::Worker`] binds to for its
/// entire lifetime. `credential` is the decrypted secret (session
/// cookie, API token, whatever the automation layer under
/// [`super::browser_port::BrowserPort`] needs) — never logged.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub id: String,
    pub supported_kinds: Vec<String>,
    pub credential: String,
}

/// Parses `ACCOUNTS_JSON`, a JSON array of `{id, supported_kinds,
/// credential}` objects, decrypting each `credential` with `codec`
/// (ciphertext produced by [`CredentialCodec::encrypt`], or plaintext
/// passed through unchanged — see `CredentialCodec::decrypt`'s
/// detection heuristic). Rejects a roster with duplicate account ids,
/// since the router's `max_inflight_per_account` accounting assumes
/// each account maps to exactly one registered worker.
pub fn load_accounts(raw_json: &str, codec: &CredentialCodec) -> Result<Vec<AccountConfig>> {
    let raw: Vec<RawAccount> =
        serde_json::from_str(raw_json).context("ACCOUNTS_JSON is not valid JSON")?;

    let mut accounts = Vec::with_capacity(raw.len());
    let mut seen = std::collections::HashSet::new();

    for entry in raw {
        if !seen.insert(entry.id.clone()) {
            anyhow::bail!("duplicate account id in ACCOUNTS_JSON: {}", entry.id);
        }
        if entry.supported_kinds.is_empty() {
            anyhow::bail!("account {} has no supported_kinds", entry.id);
        }
        let credential = codec
            .decrypt_if_needed(&entry.credential)
            .with_context(|| format!("failed to decrypt credential for account {}", entry.id))?;
        accounts.push(AccountConfig {
            id: entry.id,
            supported_kinds: entry.supported_kinds,
            credential,
        });
    }

    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> CredentialCodec {
        CredentialCodec::new("0123456789abcdef0123456789abcdef").unwrap()
    }

    #[test]
    fn parses_plaintext_credentials() {
        let codec = codec();
        let raw = r#"[{"id":"acct-1","supported_kinds":["send_messages"],"credential":"session-cookie-value"}]"#;
        let accounts = load_accounts(raw, &codec).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id, "acct-1");
        assert_eq!(accounts[0].credential, "session-cookie-value");
    }

    #[test]
    fn parses_encrypted_credentials() {
        let codec = codec();
        let ciphertext = codec.encrypt("super-secret-session").unwrap();
        let raw = format!(
            r#"[{{"id":"acct-1","supported_kinds":["send_messages"],"credential":"{ciphertext}"}}]"#
        );
        let accounts = load_accounts(&raw, &codec).unwrap();
        assert_eq!(accounts[0].credential, "super-secret-session");
    }

    #[test]
    fn rejects_duplicate_ids() {
        let codec = codec();
        let raw = r#"[
            {"id":"acct-1","supported_kinds":["send_messages"],"credential":"a"},
            {"id":"acct-1","supported_kinds":["analyze_profiles"],"credential":"b"}
        ]"#;
        assert!(load_accounts(raw, &codec).is_err());
    }

    #[test]
    fn rejects_empty_supported_kinds() {
        let codec = codec();
        let raw = r#"[{"id":"acct-1","supported_kinds":[],"credential":"a"}]"#;
        assert!(load_accounts(raw, &codec).is_err());
    }
}
