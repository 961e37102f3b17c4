use crate::domain::model::Amount;
use serde::Serialize;

pub const COLOR_GREEN: u32 = 0x2ECC71;
pub const COLOR_BLUE: u32 = 0x3498DB;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    MonitoringStarted,
    Milestone,
    Threshold,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// A rendered notification, independent of the destination it is sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub title: String,
    pub description: String,
    pub url: Option<String>,
    pub thumbnail: Option<String>,
    pub color: u32,
    pub fields: Vec<AlertField>,
}

impl Alert {
    pub fn monitoring_started(project_url: &str, initial_funding: Amount) -> Self {
        Self {
            kind: AlertKind::MonitoringStarted,
            title: "Monitoring started".to_string(),
            description: format!("Initial amount: {}", format_price(initial_funding)),
            url: None,
            thumbnail: None,
            color: COLOR_BLUE,
            fields: vec![project_link(project_url)],
        }
    }

    pub fn milestone(project_title: &str, project_url: &str, milestone: Amount, current: Amount) -> Self {
        Self {
            kind: AlertKind::Milestone,
            title: format!("🎉 {} reached {}!", project_title, format_price(milestone)),
            description: format!("✅ Raised: {}", format_price(current)),
            url: Some(project_url.to_string()),
            thumbnail: None,
            color: COLOR_GREEN,
            fields: Vec::new(),
        }
    }

    pub fn threshold(project_title: &str, project_url: &str, threshold: Amount, current: Amount) -> Self {
        Self {
            kind: AlertKind::Threshold,
            title: format!("🎯 {} reached {}!", project_title, format_price(threshold)),
            description: format!("✅ Raised: {}", format_price(current)),
            url: Some(project_url.to_string()),
            thumbnail: None,
            color: COLOR_GREEN,
            fields: vec![project_link(project_url)],
        }
    }

    pub fn with_thumbnail(mut self, image_url: Option<String>) -> Self {
        self.thumbnail = image_url;
        self
    }
}

fn project_link(project_url: &str) -> AlertField {
    AlertField {
        name: "Project link".to_string(),
        value: project_url.to_string(),
        inline: false,
    }
}

/// Formats an amount with thousands separators and the won suffix, e.g. `1,250,000원`.
pub fn format_price(amount: Amount) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped.push('원');
    grouped
}
