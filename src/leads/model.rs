//! Lead data model — contactable prospects and at-risk student contacts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channels::Channel;

/// A contactable entity tracked through an outreach funnel.
///
/// Owned by the surrounding CRM; the engine treats it as read-mostly and
/// only writes `last_contact_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    /// Unique ID.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Channel addresses (phone, messaging handle, email).
    #[serde(default)]
    pub addresses: HashMap<Channel, String>,
    /// Course/program segmentation tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<Uuid>,
    /// Funnel segmentation tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel_id: Option<Uuid>,
    /// Funnel-stage segmentation tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel_stage_id: Option<Uuid>,
    /// When the lead was last contacted on any channel. Null = never.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_contact_at: Option<DateTime<Utc>>,
    /// When the lead was created.
    pub created_at: DateTime<Utc>,
    /// When the lead was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Create a new lead with no addresses or tags.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            addresses: HashMap::new(),
            course_id: None,
            funnel_id: None,
            funnel_stage_id: None,
            last_contact_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: add a channel address.
    pub fn with_address(mut self, channel: Channel, address: impl Into<String>) -> Self {
        self.addresses.insert(channel, address.into());
        self
    }

    /// Builder: set the course tag.
    pub fn with_course(mut self, course_id: Uuid) -> Self {
        self.course_id = Some(course_id);
        self
    }

    /// Builder: set the funnel tag.
    pub fn with_funnel(mut self, funnel_id: Uuid) -> Self {
        self.funnel_id = Some(funnel_id);
        self
    }

    /// Builder: set the funnel-stage tag.
    pub fn with_funnel_stage(mut self, stage_id: Uuid) -> Self {
        self.funnel_stage_id = Some(stage_id);
        self
    }

    /// Builder: set the last contact timestamp.
    pub fn with_last_contact(mut self, at: DateTime<Utc>) -> Self {
        self.last_contact_at = Some(at);
        self
    }

    /// The lead's address for a channel, if one exists.
    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        self.addresses.get(&channel).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_addresses_and_tags() {
        let course = Uuid::new_v4();
        let lead = Lead::new("Ana Souza")
            .with_address(Channel::Whatsapp, "+5511987654321")
            .with_address(Channel::Email, "ana@uni.edu")
            .with_course(course);

        assert_eq!(lead.address_for(Channel::Whatsapp), Some("+5511987654321"));
        assert_eq!(lead.address_for(Channel::Voice), None);
        assert_eq!(lead.course_id, Some(course));
        assert!(lead.last_contact_at.is_none());
    }

    #[test]
    fn serde_roundtrip_with_channel_keyed_addresses() {
        let lead = Lead::new("Bruno Lima").with_address(Channel::Voice, "+15551234567");
        let json = serde_json::to_string(&lead).unwrap();
        let back: Lead = serde_json::from_str(&json).unwrap();
        assert_eq!(back.address_for(Channel::Voice), Some("+15551234567"));
        assert_eq!(back.id, lead.id);
    }
}
