//! Key chain - credentials for unlocking encrypted layers
//!
//! Credentials are stored per path specification (by comparable form) and
//! credential kind. A lookup walks from the requested node toward the root,
//! so a credential set on a volume also applies to specifications built on
//! top of it.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use tracing::debug;

use crate::definitions::TypeIndicator;
use crate::error::{Result, VfsError};
use crate::path_spec::{Layer, PathSpec};

/// Kind of credential an encrypted layer accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    Password,
    RecoveryPassword,
    StartupKey,
    KeyData,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Password => "password",
            CredentialKind::RecoveryPassword => "recovery_password",
            CredentialKind::StartupKey => "startup_key",
            CredentialKind::KeyData => "key_data",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential kinds each encrypted layer kind understands
pub fn supported_credentials(type_indicator: TypeIndicator) -> &'static [CredentialKind] {
    match type_indicator {
        TypeIndicator::Bde => &[
            CredentialKind::Password,
            CredentialKind::RecoveryPassword,
            CredentialKind::StartupKey,
        ],
        TypeIndicator::ApfsContainer | TypeIndicator::CoreStorage => {
            &[CredentialKind::Password, CredentialKind::RecoveryPassword]
        }
        TypeIndicator::Luksde => &[CredentialKind::Password, CredentialKind::KeyData],
        _ => &[],
    }
}

/// Credential store shared by everything resolved through one resolver
#[derive(Default)]
pub struct KeyChain {
    credentials: RwLock<HashMap<String, HashMap<CredentialKind, String>>>,
}

impl KeyChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a credential for a path specification
    pub fn set_credential(&self, path_spec: &PathSpec, kind: CredentialKind, value: impl Into<String>) -> Result<()> {
        let type_indicator = path_spec.type_indicator();
        if !supported_credentials(type_indicator).contains(&kind) {
            return Err(VfsError::PathSpec(format!(
                "{type_indicator}: unsupported credential {kind}"
            )));
        }
        let mut credentials = self
            .credentials
            .write()
            .map_err(|_| VfsError::io("key chain lock poisoned"))?;
        credentials
            .entry(path_spec.comparable().to_string())
            .or_default()
            .insert(kind, value.into());
        debug!(%type_indicator, credential = %kind, "Credential set");
        Ok(())
    }

    /// Look up a credential on this node or the nearest ancestor holding one
    pub fn get_credential(&self, path_spec: &PathSpec, kind: CredentialKind) -> Option<String> {
        let credentials = self.credentials.read().ok()?;
        let mut current = Some(path_spec);
        while let Some(node) = current {
            if let Some(value) = credentials
                .get(node.comparable())
                .and_then(|kinds| kinds.get(&kind))
            {
                return Some(value.clone());
            }
            current = node.parent().map(|p| p.as_ref());
        }
        None
    }

    /// All credentials stored for exactly this node
    pub fn get_credentials(&self, path_spec: &PathSpec) -> HashMap<CredentialKind, String> {
        self.credentials
            .read()
            .ok()
            .and_then(|c| c.get(path_spec.comparable()).cloned())
            .unwrap_or_default()
    }

    /// Copy credentials embedded in the chain's attributes into the key chain
    ///
    /// Walks the whole chain so an inline password on a lower layer is
    /// available when that layer is resolved on the way up.
    pub fn extract_credentials_from_path_spec(&self, path_spec: &PathSpec) -> Result<()> {
        for node in path_spec.chain() {
            for (kind, value) in inline_credentials(node.layer()) {
                self.set_credential(node, kind, value)?;
            }
        }
        Ok(())
    }

    /// Drop every stored credential
    pub fn empty(&self) {
        if let Ok(mut credentials) = self.credentials.write() {
            credentials.clear();
        }
    }
}

fn inline_credentials(layer: &Layer) -> Vec<(CredentialKind, &str)> {
    let candidates: Vec<(CredentialKind, &Option<String>)> = match layer {
        Layer::Bde {
            password,
            recovery_password,
            startup_key,
        } => vec![
            (CredentialKind::Password, password),
            (CredentialKind::RecoveryPassword, recovery_password),
            (CredentialKind::StartupKey, startup_key),
        ],
        Layer::ApfsContainer {
            password,
            recovery_password,
            ..
        }
        | Layer::CoreStorage {
            password,
            recovery_password,
            ..
        } => vec![
            (CredentialKind::Password, password),
            (CredentialKind::RecoveryPassword, recovery_password),
        ],
        Layer::Luksde { password, key_data } => vec![
            (CredentialKind::Password, password),
            (CredentialKind::KeyData, key_data),
        ],
        _ => Vec::new(),
    };
    candidates
        .into_iter()
        .filter_map(|(kind, value)| value.as_deref().map(|v| (kind, v)))
        .collect()
}
