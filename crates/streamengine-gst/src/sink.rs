//! Sink Factory element construction.
//!
//! Every render branch is wrapped in a bin of
//! `queue ! videoconvert ! videoscale ! <render>` with a ghost `sink` pad, so
//! the graph only ever links and unlinks one element per branch.

use gstreamer as gst;
use gst::prelude::*;
use streamengine_core::sink::{PolicyProperty, PropertyValue, RenderCapabilities, SinkCandidate, policy_settings};
use streamengine_core::{ElementId, ElementRole, SinkChain, SinkConfig, SinkPurpose};
use tracing::{debug, info};

use crate::error::{GstError, GstResult};

/// Concrete render element families the factory knows the properties of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderBackend {
    XImage,
    XvImage,
    GlImage,
    /// Auto-plugging wrapper; the real sink is a child created later
    Auto,
    /// Operator-described bin or an unrecognized factory
    Other,
}

impl RenderBackend {
    /// Backend for a factory name.
    #[must_use]
    pub fn from_factory(name: &str) -> Self {
        match name {
            "ximagesink" => Self::XImage,
            "xvimagesink" => Self::XvImage,
            "glimagesink" => Self::GlImage,
            "autovideosink" => Self::Auto,
            _ => Self::Other,
        }
    }

    /// Backend of an existing element.
    #[must_use]
    pub fn of(element: &gst::Element) -> Self {
        element.factory().map_or(Self::Other, |factory| Self::from_factory(factory.name().as_str()))
    }
}

impl RenderCapabilities for RenderBackend {
    fn supports(&self, property: PolicyProperty) -> bool {
        match self {
            Self::XImage | Self::XvImage | Self::GlImage => matches!(
                property,
                PolicyProperty::Sync | PolicyProperty::Qos | PolicyProperty::ForceAspectRatio
            ),
            Self::Auto => property == PolicyProperty::Sync,
            Self::Other => false,
        }
    }
}

/// Apply the low-latency rendering policy to `element`.
pub(crate) fn apply_policy(element: &gst::Element) {
    let backend = RenderBackend::of(element);
    for (property, value) in policy_settings(&backend) {
        match value {
            PropertyValue::Bool(v) => element.set_property(property.name(), v),
            PropertyValue::UInt(v) => element.set_property(property.name(), v),
        }
    }
}

/// A freshly built, unlinked render branch.
pub struct BuiltSink {
    pub bin: gst::Element,
    pub chain: SinkChain,
}

/// Builds render branches from the configured candidate lists.
pub struct SinkFactory {
    config: SinkConfig,
    next_id: u32,
}

impl SinkFactory {
    #[must_use]
    pub fn new(config: SinkConfig) -> Self {
        Self { config, next_id: 0 }
    }

    /// Build a branch for `purpose`, trying candidates in order.
    pub fn build(&mut self, purpose: SinkPurpose) -> GstResult<BuiltSink> {
        self.next_id += 1;
        let n = self.next_id;
        let prefix = match purpose {
            SinkPurpose::Preview => "preview",
            SinkPurpose::Output => "output",
        };

        let render_name = format!("{prefix}-sink{n}");
        let render = self
            .config
            .candidates(purpose)
            .iter()
            .find_map(|candidate| make_render(candidate, &render_name))
            .ok_or(GstError::NoRenderBackend)?;

        let bin_name = format!("{prefix}-bin{n}");
        let queue_name = format!("{prefix}-queue{n}");
        let convert_name = format!("{prefix}-convert{n}");
        let scale_name = format!("{prefix}-scale{n}");

        let bin = gst::Bin::builder().name(bin_name.as_str()).build();
        let queue = gst::ElementFactory::make("queue").name(queue_name.as_str()).build()?;
        let convert = gst::ElementFactory::make("videoconvert").name(convert_name.as_str()).build()?;
        let scale = gst::ElementFactory::make("videoscale").name(scale_name.as_str()).build()?;

        bin.add_many([&queue, &convert, &scale, &render])?;
        gst::Element::link_many([&queue, &convert, &scale, &render])?;

        let target = queue.static_pad("sink").ok_or_else(|| GstError::MissingPad("sink".to_string()))?;
        let ghost = gst::GhostPad::with_target(&target)?;
        bin.add_pad(&ghost)?;

        let chain = SinkChain::composite(ElementId::new(bin_name))
            .with_element(ElementId::new(queue_name), ElementRole::Queue)
            .with_element(ElementId::new(convert_name), ElementRole::Colorspace)
            .with_element(ElementId::new(scale_name), ElementRole::Scale)
            .with_element(ElementId::new(render_name), ElementRole::Render);

        Ok(BuiltSink { bin: bin.upcast(), chain })
    }
}

/// Build one candidate and check it can open its display.
fn make_render(candidate: &SinkCandidate, name: &str) -> Option<gst::Element> {
    let element = match candidate {
        SinkCandidate::Factory(factory) => match gst::ElementFactory::make(factory).name(name).build() {
            Ok(element) => element,
            Err(e) => {
                debug!(%factory, error = %e, "Render element unavailable");
                return None;
            }
        },
        SinkCandidate::Description(description) => match gst::parse::bin_from_description(description, true) {
            Ok(bin) => {
                bin.set_property("name", name);
                bin.upcast()
            }
            Err(e) => {
                debug!(%description, error = %e, "Failed to parse sink description");
                return None;
            }
        },
    };

    // xvimagesink in particular only finds out it has no free port here
    if element.set_state(gst::State::Ready).is_err() {
        debug!(?candidate, "Render element could not reach READY");
        let _ = element.set_state(gst::State::Null);
        return None;
    }
    let _ = element.set_state(gst::State::Null);

    apply_policy(&element);
    info!(?candidate, backend = ?RenderBackend::of(&element), "Built render element");
    Some(element)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_factory() {
        assert_eq!(RenderBackend::from_factory("xvimagesink"), RenderBackend::XvImage);
        assert_eq!(RenderBackend::from_factory("autovideosink"), RenderBackend::Auto);
        assert_eq!(RenderBackend::from_factory("fakesink"), RenderBackend::Other);
    }

    #[test]
    fn test_x_backends_take_full_policy() {
        let settings = policy_settings(&RenderBackend::XImage);
        let names: Vec<_> = settings.iter().map(|(p, _)| p.name()).collect();
        assert_eq!(names, vec!["sync", "qos", "force-aspect-ratio"]);
        assert!(settings.contains(&(PolicyProperty::ForceAspectRatio, PropertyValue::Bool(true))));
    }

    #[test]
    fn test_unknown_backends_are_left_alone() {
        assert!(policy_settings(&RenderBackend::Other).is_empty());
        assert_eq!(
            policy_settings(&RenderBackend::Auto),
            vec![(PolicyProperty::Sync, PropertyValue::Bool(false))]
        );
    }
}
