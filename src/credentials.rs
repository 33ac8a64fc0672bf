use zeroize::Zeroize;

/// API key for the analysis service. Zeroed on drop, never printed.
///
/// Passed explicitly into every analysis call; the crate keeps no
/// process-wide key.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct ApiKey {
    secret: String,
}

impl ApiKey {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// A key that is empty or whitespace is treated as missing.
    pub fn is_blank(&self) -> bool {
        self.secret.trim().is_empty()
    }

    /// Raw key for the HTTP client (internal use only).
    pub(crate) fn expose(&self) -> &str {
        self.secret.trim()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}
