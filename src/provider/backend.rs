//! Backend variants.
//!
//! Both variants speak the same chat completions protocol but differ in
//! how they are addressed and authenticated.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BackendVariant {
    /// Public API: bearer auth, model in the body.
    #[default]
    #[serde(rename = "openai")]
    Direct,
    /// Deployment-scoped gateway: `api-key` header, model selected by the
    /// deployment in the URL.
    #[serde(rename = "azure")]
    Gateway,
}

impl BackendVariant {
    pub const ALL: &'static [BackendVariant] = &[BackendVariant::Direct, BackendVariant::Gateway];

    /// Configuration identifier.
    pub fn id(self) -> &'static str {
        match self {
            BackendVariant::Direct => "openai",
            BackendVariant::Gateway => "azure",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|variant| variant.id().eq_ignore_ascii_case(id.trim()))
    }

    /// Whether the model identifier travels in the request body.
    pub fn sends_model(self) -> bool {
        self == BackendVariant::Direct
    }

    /// Whether the organization header may be sent.
    pub fn supports_organization(self) -> bool {
        self == BackendVariant::Direct
    }
}
