//! Text-composition port (spec.md §6): `compose_message(context,
//! template_id?) -> string`. Exact generated message text is an explicit
//! Non-goal; this module only defines the contract `send_messages` runs
//! against plus a deterministic template-substitution implementation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageContext {
    pub username: String,
    pub category: Option<String>,
    pub followers: Option<u64>,
    pub avg_views: Option<f64>,
    pub engagement_score: Option<f64>,
    pub success_score: Option<f64>,
}

pub trait TextComposer: Send + Sync {
    fn compose_message(&self, context: &MessageContext, template_id: Option<&str>) -> String;
}

/// Simple `{placeholder}` substitution over a small built-in template
/// table, falling back to a generic greeting when no template matches.
pub struct TemplateComposer;

impl TextComposer for TemplateComposer {
    fn compose_message(&self, context: &MessageContext, template_id: Option<&str>) -> String {
        let template = match template_id {
            Some("collab_pitch") => {
                "Hey {username}, loved your {category} content — want to collaborate?"
            }
            Some("high_engagement") => {
                "Hi {username}! Your engagement is impressive, let's talk partnership."
            }
            _ => "Hi {username}, we'd love to connect.",
        };
        template.replace("{username}", &context.username).replace(
            "{category}",
            context.category.as_deref().unwrap_or("your"),
        )
    }
}
