//! GStreamer backend.
//!
//! Status messages are taken off the bus by a synchronous handler on the
//! posting thread and forwarded to the status channel, so nothing but the
//! control loop ever reacts to them.

use super::{
    EventSource, FormatFilter, GraphEngine, LifecycleState, NodeId, NodeKind, PropertyValue,
    StateChange, StatusEvent, StatusSender,
};
use crate::error::{DriftError, Result};
use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;
use std::collections::HashMap;

/// Capture source as reported by the device monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// Name to pass as source name.
    pub name: String,
    pub description: String,
}

/// Graph engine backed by a `gst::Pipeline`.
pub struct GstEngine {
    pipeline: gst::Pipeline,
    elements: HashMap<NodeId, gst::Element>,
}

impl GstEngine {
    /// Initialise GStreamer and create an empty pipeline.
    pub fn new() -> Result<Self> {
        gst::init().map_err(|e| DriftError::Engine {
            message: format!("Failed to initialise GStreamer: {e}"),
        })?;
        Ok(Self {
            pipeline: gst::Pipeline::with_name("driftmeasure"),
            elements: HashMap::new(),
        })
    }

    fn element(&self, id: &NodeId) -> Result<&gst::Element> {
        self.elements.get(id).ok_or_else(|| DriftError::UnknownNode {
            node: id.to_string(),
        })
    }
}

impl Drop for GstEngine {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::debug!("Pipeline teardown on drop failed: {e}");
        }
    }
}

fn to_gst_state(state: LifecycleState) -> gst::State {
    match state {
        LifecycleState::Null => gst::State::Null,
        LifecycleState::Ready => gst::State::Ready,
        LifecycleState::Paused => gst::State::Paused,
        LifecycleState::Playing => gst::State::Playing,
    }
}

fn from_gst_state(state: gst::State) -> Option<LifecycleState> {
    match state {
        gst::State::Null => Some(LifecycleState::Null),
        gst::State::Ready => Some(LifecycleState::Ready),
        gst::State::Paused => Some(LifecycleState::Paused),
        gst::State::Playing => Some(LifecycleState::Playing),
        _ => None,
    }
}

fn to_value(value: &PropertyValue) -> Option<glib::Value> {
    match value {
        PropertyValue::Bool(v) => Some(v.to_value()),
        PropertyValue::U32(v) => Some(v.to_value()),
        PropertyValue::U64(v) => Some(v.to_value()),
        PropertyValue::I64(v) => Some(v.to_value()),
        PropertyValue::F32(v) => Some(v.to_value()),
        PropertyValue::Str(v) => Some(v.to_value()),
        PropertyValue::Enum(_) => None,
    }
}

/// Translate a bus message into a status event. Messages the control loop
/// has no use for yield `None`.
fn translate(msg: &gst::Message, pipeline: &glib::WeakRef<gst::Pipeline>) -> Option<StatusEvent> {
    use gst::MessageView;

    let src = msg.src();
    let src_name = src.map(|s| s.name().to_string()).unwrap_or_default();
    let source = match (src, pipeline.upgrade()) {
        (Some(s), Some(p)) if s == p.upcast_ref::<gst::Object>() => EventSource::Graph,
        (Some(s), _) => EventSource::Node(NodeId::new(s.name().as_str())),
        (None, _) => EventSource::Unknown,
    };

    match msg.view() {
        MessageView::StateChanged(sc) => Some(StatusEvent::StateChanged(StateChange {
            old: from_gst_state(sc.old())?,
            new: from_gst_state(sc.current())?,
            pending: from_gst_state(sc.pending()),
            source,
        })),
        MessageView::Info(info) => Some(StatusEvent::Info {
            message: format!("Info from {src_name}: {}", info.error()),
            detail: info.debug().map(|d| d.to_string()),
        }),
        MessageView::Warning(warning) => Some(StatusEvent::Warning {
            message: format!("Warning from {src_name}: {}", warning.error()),
            detail: warning.debug().map(|d| d.to_string()),
        }),
        MessageView::Error(err) => Some(StatusEvent::Error {
            message: format!("Error from {src_name}: {}", err.error()),
            detail: err.debug().map(|d| d.to_string()),
        }),
        MessageView::Latency(_) => Some(StatusEvent::Latency),
        MessageView::Eos(_) => Some(StatusEvent::EndOfStream),
        _ => None,
    }
}

impl GraphEngine for GstEngine {
    fn is_available(&self, kind: NodeKind) -> bool {
        gst::ElementFactory::find(kind.factory_name()).is_some()
    }

    fn create_node(&mut self, kind: NodeKind, name: &str) -> Result<NodeId> {
        let element = gst::ElementFactory::make(kind.factory_name())
            .name(name)
            .build()
            .map_err(|_| DriftError::NodeUnavailable {
                factory: kind.factory_name().to_string(),
                role: name.to_string(),
            })?;
        self.pipeline.add(&element).map_err(|e| DriftError::Engine {
            message: format!("Could not add {name} to the pipeline: {e}"),
        })?;
        let id = NodeId::new(name);
        self.elements.insert(id.clone(), element);
        Ok(id)
    }

    fn link(&mut self, from: &NodeId, to: &NodeId, filter: Option<&FormatFilter>) -> Result<()> {
        let src = self.element(from)?;
        let sink = self.element(to)?;
        let result = match filter {
            Some(filter) => {
                let caps = gst::Caps::builder(filter.media_type)
                    .field("rate", i32::try_from(filter.rate).unwrap_or(i32::MAX))
                    .field("channels", i32::try_from(filter.channels).unwrap_or(i32::MAX))
                    .build();
                src.link_filtered(sink, &caps)
            }
            None => src.link(sink),
        };
        result.map_err(|e| DriftError::Link {
            from: from.to_string(),
            to: to.to_string(),
            message: e.to_string(),
        })
    }

    fn set_property(
        &mut self,
        node: &NodeId,
        property: &str,
        value: PropertyValue,
    ) -> Result<()> {
        let element = self.element(node)?;
        let fail = |message: String| DriftError::Property {
            node: node.to_string(),
            property: property.to_string(),
            message,
        };

        let pspec = element
            .find_property(property)
            .ok_or_else(|| fail("no such property".to_string()))?;
        if !pspec.flags().contains(glib::ParamFlags::WRITABLE) {
            return Err(fail("property is not writable".to_string()));
        }

        if let PropertyValue::Enum(nick) = value {
            let known = pspec
                .downcast_ref::<glib::ParamSpecEnum>()
                .is_some_and(|spec| spec.enum_class().value_by_nick(nick).is_some());
            if !known {
                return Err(fail(format!("\"{nick}\" is not a valid value")));
            }
            element.set_property_from_str(property, nick);
            return Ok(());
        }

        let Some(gvalue) = to_value(&value) else {
            return Err(fail(format!("unsupported value {value}")));
        };
        if pspec.value_type() != gvalue.type_() {
            return Err(fail(format!(
                "expected {}, got {}",
                pspec.value_type(),
                gvalue.type_()
            )));
        }
        element.set_property_from_value(property, &gvalue);
        Ok(())
    }

    fn set_state(&mut self, target: LifecycleState) -> Result<()> {
        self.pipeline
            .set_state(to_gst_state(target))
            .map(|_| ())
            .map_err(|e| DriftError::StateChange {
                target: target.name().to_string(),
                message: e.to_string(),
            })
    }

    fn send_end_of_stream(&mut self) -> bool {
        self.pipeline.send_event(gst::event::Eos::new())
    }

    fn recalculate_latency(&mut self) -> Result<()> {
        self.pipeline
            .recalculate_latency()
            .map_err(|e| DriftError::Engine {
                message: format!("Latency recalculation failed: {e}"),
            })
    }

    fn render_topology(&self) -> String {
        gst::debug_bin_to_dot_data(&self.pipeline, gst::DebugGraphDetails::all()).to_string()
    }

    fn attach_status_sink(&mut self, sink: StatusSender) -> Result<()> {
        let bus = self.pipeline.bus().ok_or_else(|| DriftError::Engine {
            message: "Pipeline has no bus".to_string(),
        })?;
        let pipeline = self.pipeline.downgrade();
        bus.set_sync_handler(move |_, msg| {
            if let Some(event) = translate(msg, &pipeline) {
                // Receiver gone means the control loop has finished.
                sink.send(event).ok();
            }
            gst::BusSyncReply::Drop
        });
        Ok(())
    }
}

/// Enumerate capture sources known to the device monitor.
pub fn list_sources() -> Result<Vec<SourceInfo>> {
    gst::init().map_err(|e| DriftError::Engine {
        message: format!("Failed to initialise GStreamer: {e}"),
    })?;

    let monitor = gst::DeviceMonitor::new();
    if monitor.add_filter(Some("Audio/Source"), None).is_none() {
        tracing::warn!("Device monitor rejected the audio source filter");
    }
    monitor.start().map_err(|e| DriftError::Engine {
        message: format!("Failed to start device monitor: {e}"),
    })?;
    let devices = monitor.devices();
    monitor.stop();

    Ok(devices
        .iter()
        .map(|device| {
            let name = if device.find_property("internal-name").is_some() {
                device.property::<String>("internal-name")
            } else {
                device.name().to_string()
            };
            SourceInfo {
                name,
                description: device.display_name().to_string(),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mapping_round_trips() {
        for state in [
            LifecycleState::Null,
            LifecycleState::Ready,
            LifecycleState::Paused,
            LifecycleState::Playing,
        ] {
            assert_eq!(from_gst_state(to_gst_state(state)), Some(state));
        }
        assert_eq!(from_gst_state(gst::State::VoidPending), None);
    }

    #[test]
    fn test_enum_values_have_no_direct_conversion() {
        assert!(to_value(&PropertyValue::Enum("none")).is_none());
        assert!(to_value(&PropertyValue::U64(5)).is_some());
    }
}
