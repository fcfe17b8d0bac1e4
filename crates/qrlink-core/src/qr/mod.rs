//! QR parameter policy: level selection, validation scoring and encoding.

pub mod encoder;
pub mod hybrid;
pub mod level;
pub mod validation;

pub use encoder::{
    has_png_signature, parse_hex_color, read_png_dimensions, validate_png_file, EncodedImage, PngQrEncoder, QrEncoder,
    PNG_SIGNATURE,
};
pub use hybrid::{FallbackStrategy, LengthBucket, OptimalQrConfig, QrHybridConfig, QrHybridConfigManager};
pub use level::{ErrorCorrectionLevel, ViewingContext};
pub use validation::{
    default_candidates, ContentMetrics, ContextMetrics, GenerationMetrics, QrComparison,
    QrValidationEngine, QrValidationResult, ScoredConfig,
};
