//! Model table: which image models exist and which execution path serves them

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Image generation models callers can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr)]
pub enum ImageModel {
    #[strum(serialize = "gpt-image-1")]
    GptImage1,
    #[strum(serialize = "gpt-image-1.5")]
    GptImage15,
    #[strum(serialize = "gemini-3-pro-image-preview")]
    Gemini3ProImagePreview,
    #[strum(serialize = "imagen-4.0-ultra-generate-001")]
    Imagen4Ultra,
}

/// Providers with an asynchronous multi-item batch API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum BatchProviderKind {
    Openai,
    Google,
}

/// Execution path for a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Submitted as part of an external batch job and polled later
    Batch(BatchProviderKind),
    /// Generated inline, one item at a time, during batch creation
    Synchronous,
}

impl ImageModel {
    /// Upstream model name
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Human-readable label reported with generated images
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::GptImage1 => "GPT Image 1",
            Self::GptImage15 => "GPT Image 1.5",
            Self::Gemini3ProImagePreview => "Gemini 3 Pro",
            Self::Imagen4Ultra => "Imagen 4 Ultra",
        }
    }

    pub const fn route(self) -> Route {
        match self {
            Self::GptImage1 | Self::GptImage15 => Route::Batch(BatchProviderKind::Openai),
            Self::Gemini3ProImagePreview => Route::Batch(BatchProviderKind::Google),
            Self::Imagen4Ultra => Route::Synchronous,
        }
    }
}

impl BatchProviderKind {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}
