//! Outbound chat integrations: LINE for forwarded mail, Slack for alerts.

pub mod line;
pub mod slack;
