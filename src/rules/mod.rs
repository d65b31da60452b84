//! Outreach rule configuration and resolution.

pub mod model;
pub mod resolver;

pub use model::{
    ChannelPlan, DialingRule, RedialInterval, ReengagementRule, RuleSnapshot, SegmentCatalog,
    Segmentation,
};
pub use resolver::{EffectiveRule, Resolution, RuleWarning, ShadowedRule, resolve};
