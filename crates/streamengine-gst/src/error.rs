//! GStreamer backend error types.

use gstreamer as gst;
use gst::glib;
use streamengine_core::GraphError;
use thiserror::Error;

/// GStreamer backend error type.
#[derive(Debug, Error)]
pub enum GstError {
    #[error("GStreamer error: {0}")]
    Glib(#[from] glib::Error),

    #[error("{0}")]
    Bool(#[from] glib::BoolError),

    #[error("state change failed: {0}")]
    StateChange(#[from] gst::StateChangeError),

    #[error("pad link failed: {0}")]
    PadLink(#[from] gst::PadLinkError),

    #[error("invalid caps: {0}")]
    Caps(String),

    #[error("no usable video source")]
    NoSource,

    #[error("no render backend could be built")]
    NoRenderBackend,

    #[error("element has no pad named {0}")]
    MissingPad(String),

    #[error("junction refused a request pad")]
    NoRequestPad,

    #[error("unknown sink chain: {0}")]
    UnknownChain(String),

    #[error("pipeline is not running")]
    NotRunning,

    #[error("X11 client library unavailable: {0}")]
    DisplayLibrary(String),
}

/// Result type for GStreamer backend operations.
pub type GstResult<T> = Result<T, GstError>;

impl From<GstError> for GraphError {
    fn from(err: GstError) -> Self {
        match err {
            GstError::NoRenderBackend => Self::NoRenderBackend,
            GstError::NotRunning => Self::NotRunning,
            GstError::UnknownChain(root) => Self::UnknownChain(root),
            GstError::StateChange(e) => Self::StateChange(e.to_string()),
            e @ (GstError::PadLink(_) | GstError::NoRequestPad | GstError::MissingPad(_)) => Self::Link(e.to_string()),
            e => Self::Construction(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_graph_error_mapping() {
        assert_matches!(GraphError::from(GstError::NoRenderBackend), GraphError::NoRenderBackend);
        assert_matches!(GraphError::from(GstError::NoRequestPad), GraphError::Link(_));
        assert_matches!(GraphError::from(GstError::NoSource), GraphError::Construction(_));
        assert_matches!(
            GraphError::from(GstError::UnknownChain("preview-bin1".into())),
            GraphError::UnknownChain(root) if root == "preview-bin1"
        );
    }
}
