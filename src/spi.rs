//! Pluggable host ports
//!
//! External collaborators the container talks to but never implements:
//! transaction integration, conversation-id propagation over a host
//! protocol, and boot-time extension hooks.

use crate::knowledge::KnowledgeBase;
use crate::meta::TypeSpace;

/// Callback pair registered with the host transaction service
pub trait TransactionSynchronization: Send + Sync {
    fn before_completion(&self);
    fn after_completion(&self, committed: bool);
}

/// Port to the host transaction service
pub trait TransactionServices: Send + Sync {
    fn is_transaction_active(&self) -> bool;
    fn register_synchronization(&self, synchronization: Box<dyn TransactionSynchronization>);
}

/// Port carrying conversation ids in a host protocol (cookie, header,
/// message property). The container reads the incoming id, writes the
/// current one back, and asks whether the conversation should end.
pub trait ConversationCarrier: Send + Sync {
    fn read_id(&self) -> Option<String>;
    fn write_id(&self, id: &str);
    fn should_end(&self) -> bool;
}

/// Boot-time hooks. Both callbacks run between discovery and verification,
/// on the booting thread; the knowledge base is still mutable at that
/// point.
pub trait Extension: Send + Sync {
    /// After type discovery, before bean registration completes
    fn types_discovered(&self, _space: &TypeSpace, _kb: &KnowledgeBase) {}

    /// After every bean descriptor has been registered
    fn after_bean_registration(&self, _kb: &KnowledgeBase) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingCarrier {
        stored: Mutex<Option<String>>,
        end: bool,
    }

    impl ConversationCarrier for RecordingCarrier {
        fn read_id(&self) -> Option<String> {
            self.stored.lock().clone()
        }

        fn write_id(&self, id: &str) {
            *self.stored.lock() = Some(id.to_string());
        }

        fn should_end(&self) -> bool {
            self.end
        }
    }

    #[test]
    fn carrier_round_trip() {
        let carrier = RecordingCarrier::default();
        assert_eq!(carrier.read_id(), None);
        carrier.write_id("c-42");
        assert_eq!(carrier.read_id().as_deref(), Some("c-42"));
        assert!(!carrier.should_end());
    }
}
