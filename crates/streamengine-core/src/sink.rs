//! Sink Factory policy: candidate ordering and render-policy properties.
//!
//! Element construction itself belongs to the graph backend; this module
//! decides what to try and which properties to apply.

use serde::{Deserialize, Serialize};

/// What a sink chain is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkPurpose {
    Preview,
    Output,
}

/// One thing the backend may try to build, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCandidate {
    /// Operator-supplied element description, parsed as a bin
    Description(String),
    /// Named render element factory
    Factory(String),
}

/// Sink selection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Description overriding every candidate when set
    pub override_description: Option<String>,
    /// Factories tried for local preview surfaces
    pub preview_candidates: Vec<String>,
    /// Factories tried for remote output surfaces
    pub output_candidates: Vec<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            override_description: None,
            // ximagesink first so the (usually single) xv port stays free for output
            preview_candidates: vec![
                "ximagesink".to_string(),
                "autovideosink".to_string(),
                "xvimagesink".to_string(),
            ],
            output_candidates: vec![
                "autovideosink".to_string(),
                "xvimagesink".to_string(),
                "ximagesink".to_string(),
            ],
        }
    }
}

impl SinkConfig {
    /// Ordered candidates for `purpose`.
    ///
    /// An override replaces the list entirely; a broken override is a
    /// creation failure, not a reason to fall back silently.
    #[must_use]
    pub fn candidates(&self, purpose: SinkPurpose) -> Vec<SinkCandidate> {
        if let Some(description) = self.override_description.as_deref().filter(|d| !d.trim().is_empty()) {
            return vec![SinkCandidate::Description(description.to_string())];
        }

        let names = match purpose {
            SinkPurpose::Preview => &self.preview_candidates,
            SinkPurpose::Output => &self.output_candidates,
        };
        let mut candidates: Vec<SinkCandidate> = Vec::with_capacity(names.len());
        for name in names {
            let candidate = SinkCandidate::Factory(name.clone());
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }
}

/// Rendering-policy properties applied to render elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyProperty {
    Sync,
    Qos,
    ForceAspectRatio,
    PrerollQueueLen,
}

impl PolicyProperty {
    pub const ALL: [Self; 4] = [Self::Sync, Self::Qos, Self::ForceAspectRatio, Self::PrerollQueueLen];

    /// Property name on the render element.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Qos => "qos",
            Self::ForceAspectRatio => "force-aspect-ratio",
            Self::PrerollQueueLen => "preroll-queue-len",
        }
    }

    /// Value the low-latency policy wants.
    #[must_use]
    pub fn policy_value(self) -> PropertyValue {
        match self {
            Self::Sync | Self::Qos => PropertyValue::Bool(false),
            Self::ForceAspectRatio => PropertyValue::Bool(true),
            // one buffer lets several branches preroll off the junction without queues
            Self::PrerollQueueLen => PropertyValue::UInt(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyValue {
    Bool(bool),
    UInt(u32),
}

/// Typed capability check implemented by each render backend variant.
pub trait RenderCapabilities {
    fn supports(&self, property: PolicyProperty) -> bool;
}

/// Properties to apply to a render element, in application order.
#[must_use]
pub fn policy_settings(capabilities: &dyn RenderCapabilities) -> Vec<(PolicyProperty, PropertyValue)> {
    PolicyProperty::ALL
        .into_iter()
        .filter(|p| capabilities.supports(*p))
        .map(|p| (p, p.policy_value()))
        .collect()
}
