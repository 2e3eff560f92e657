//! Property-based tests for the wire-facing types
//!
//! Announcements must keep their flat key layout for any user-supplied text, and
//! descriptor decoding must never panic on whatever a central writes.

use offchat_core::{
    DeviceId, DiscoveryAnnouncement, GattChannel, ListenerEvent, OffchatError,
    SubscriptionRequest, Timestamp,
};
use proptest::prelude::*;
use serde_json::Value;

proptest! {
    #[test]
    fn prop_announcement_keys_are_fixed(
        user_id in ".{0,40}",
        username in ".{0,40}",
        millis in 0u64..=4_102_444_800_000,
    ) {
        let announcement = DiscoveryAnnouncement::new(&user_id, &username, Timestamp::new(millis));
        let bytes = announcement.to_bytes().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        let object = value.as_object().unwrap();

        let keys: Vec<&str> = object.keys().map(String::as_str).collect();
        let mut expected = vec!["id", "type", "userId", "username", "timestamp"];
        expected.sort_unstable();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        prop_assert_eq!(sorted, expected);

        prop_assert_eq!(object["type"].as_str(), Some("discovery"));
        prop_assert_eq!(object["userId"].as_str(), Some(user_id.as_str()));
        prop_assert_eq!(object["username"].as_str(), Some(username.as_str()));
        prop_assert_eq!(object["timestamp"].as_u64(), Some(millis));
    }

    #[test]
    fn prop_cccd_decoding_is_total(value in prop::collection::vec(any::<u8>(), 0..4)) {
        match SubscriptionRequest::from_cccd_value(&value) {
            Ok(request) => {
                prop_assert_eq!(value.len(), 2);
                // Decoded requests re-encode to a canonical value with the same enable bit
                let canonical = request.to_cccd_value();
                prop_assert_eq!(canonical[0] != 0, value[0] & 0x03 != 0);
            }
            Err(e) => prop_assert!(
                matches!(e, OffchatError::InvalidDescriptorValue { .. }),
                "unexpected error {:?}",
                e
            ),
        }
    }

    #[test]
    fn prop_received_data_is_valid_utf8(payload in prop::collection::vec(any::<u8>(), 0..64)) {
        let event =
            ListenerEvent::received(GattChannel::Message, DeviceId::new("AA"), &payload);
        let map = event.payload();
        let json = serde_json::to_string(&map).unwrap();
        prop_assert!(serde_json::from_str::<Value>(&json).is_ok());

        if let Ok(text) = std::str::from_utf8(&payload) {
            prop_assert_eq!(map["data"].as_str(), Some(text));
        }
    }
}
