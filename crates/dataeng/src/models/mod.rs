pub mod preview_envelope;

pub use preview_envelope::{
    HINT_WARNING_CODE, PREVIEW_ENVELOPE_SCHEMA_VERSION, PreviewEnvelope, PreviewEnvelopeError,
    PreviewEnvelopeMeta, PreviewEnvelopeWarning,
};
