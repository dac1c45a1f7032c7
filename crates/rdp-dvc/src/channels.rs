//! The listener registry: `by_name` records every listener the host has
//! registered, `by_id` maps the channel ids the server has bound to them.
//! A listener is looked up by name at CREATE time and by id for every
//! subsequent DATA/DATA_FIRST/CLOSE.

use std::collections::BTreeMap;

use rdp_pdu::dvc::{DynamicChannelId, FieldType};

use crate::error::{DvcError, DvcErrorKind, DvcResult};
use crate::reassembly::Reassembly;

/// Implemented by the host code that owns one dynamic virtual channel.
pub trait DvcListener: Send {
    /// Called once the server has bound a channel id to this listener.
    /// Any returned payloads are sent immediately, in order.
    fn start(&mut self, _channel_id: DynamicChannelId) -> Vec<Vec<u8>> {
        Vec::new()
    }

    /// Called with each fully reassembled inbound payload.
    fn process(&mut self, channel_id: DynamicChannelId, payload: &[u8]) -> Vec<Vec<u8>>;

    /// Called when the server closes the channel.
    fn close(&mut self, _channel_id: DynamicChannelId) {}
}

struct Listener {
    handler: Box<dyn DvcListener>,
    binding: Option<Binding>,
    reassembly: Reassembly,
}

struct Binding {
    channel_id: DynamicChannelId,
    width: FieldType,
}

/// Registers listeners by channel name and tracks which dynamic channel id
/// (if any) the server has bound each of them to.
#[derive(Default)]
pub struct ChannelSet {
    by_name: BTreeMap<String, Listener>,
    by_id: BTreeMap<DynamicChannelId, String>,
}

impl ChannelSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_listener(&mut self, name: impl Into<String>, handler: Box<dyn DvcListener>) -> DvcResult<()> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(DvcError::new(
                "init_listener",
                DvcErrorKind::ListenerAlreadyRegistered(name),
            ));
        }
        self.by_name.insert(
            name,
            Listener {
                handler,
                binding: None,
                reassembly: Reassembly::new(),
            },
        );
        Ok(())
    }

    /// Binds an `Unbound` listener registered under `name` to `channel_id`,
    /// returning the messages the listener wants to send right away.
    ///
    /// Returns `None` if no listener is registered under that name, or it is
    /// already bound to a different id.
    pub fn bind(&mut self, name: &str, channel_id: DynamicChannelId, width: FieldType) -> Option<Vec<Vec<u8>>> {
        let listener = self.by_name.get_mut(name)?;
        if listener.binding.is_some() {
            return None;
        }
        listener.binding = Some(Binding { channel_id, width });
        self.by_id.insert(channel_id, name.to_owned());
        Some(listener.handler.start(channel_id))
    }

    pub fn width_of(&self, channel_id: DynamicChannelId) -> Option<FieldType> {
        let name = self.by_id.get(&channel_id)?;
        self.by_name.get(name)?.binding.as_ref().map(|b| b.width)
    }

    /// Feeds a fully reassembled inbound payload to the listener bound to
    /// `channel_id`, returning the listener's reply messages. Returns `None`
    /// if the id does not resolve to a bound listener.
    pub fn dispatch(&mut self, channel_id: DynamicChannelId, payload: &[u8]) -> Option<Vec<Vec<u8>>> {
        let name = self.by_id.get(&channel_id)?;
        let listener = self.by_name.get_mut(name)?;
        Some(listener.handler.process(channel_id, payload))
    }

    pub fn reassembly_mut(&mut self, channel_id: DynamicChannelId) -> Option<&mut Reassembly> {
        let name = self.by_id.get(&channel_id)?;
        self.by_name.get_mut(name).map(|l| &mut l.reassembly)
    }

    /// Marks the listener bound to `channel_id` `Unbound` again. The
    /// listener record itself is retained (not removed from `by_name`), so
    /// the server can re-create the same named channel later.
    pub fn unbind(&mut self, channel_id: DynamicChannelId) {
        if let Some(name) = self.by_id.remove(&channel_id) {
            if let Some(listener) = self.by_name.get_mut(&name) {
                listener.binding = None;
                listener.reassembly = Reassembly::new();
                listener.handler.close(channel_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl DvcListener for Echo {
        fn process(&mut self, _channel_id: DynamicChannelId, payload: &[u8]) -> Vec<Vec<u8>> {
            vec![payload.to_vec()]
        }
    }

    #[test]
    fn re_registering_a_name_is_rejected_without_disturbing_the_original() {
        let mut set = ChannelSet::new();
        set.init_listener("cliprdr", Box::new(Echo)).unwrap();
        assert!(set.init_listener("cliprdr", Box::new(Echo)).is_err());
        assert!(set.bind("cliprdr", 7, FieldType::U8).is_some());
    }

    #[test]
    fn unbind_retains_the_listener_record_for_re_creation() {
        let mut set = ChannelSet::new();
        set.init_listener("cliprdr", Box::new(Echo)).unwrap();
        set.bind("cliprdr", 7, FieldType::U8).unwrap();
        set.unbind(7);

        assert!(set.width_of(7).is_none());
        // the name is still registered, so it can be bound to a new id
        assert!(set.bind("cliprdr", 9, FieldType::U16).is_some());
    }

    #[test]
    fn dispatch_to_unknown_id_returns_none() {
        let mut set = ChannelSet::new();
        assert!(set.dispatch(42, &[1, 2, 3]).is_none());
    }
}
