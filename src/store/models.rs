use crate::store::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const INVALID_OVERLAY_KIND: &str = "Overlay type must be either \"text\" or \"logo\"";

/// A saved RTSP source definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSetting {
    pub id: u64,
    pub rtsp_url: String,
    pub stream_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StreamSetting {
    pub fn new(rtsp_url: String, stream_name: String, is_active: bool, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            rtsp_url,
            stream_name,
            is_active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the fields present in `fields`.
    pub fn apply(&mut self, fields: StreamSettingFields, now: DateTime<Utc>) {
        if let Some(rtsp_url) = fields.rtsp_url {
            self.rtsp_url = rtsp_url;
        }
        if let Some(stream_name) = fields.stream_name {
            self.stream_name = stream_name;
        }
        if let Some(is_active) = fields.is_active {
            self.is_active = is_active;
        }
        self.updated_at = now;
    }
}

impl Record for StreamSetting {
    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

/// Request body for creating or updating a [`StreamSetting`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamSettingFields {
    pub rtsp_url: Option<String>,
    pub stream_name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    Text,
    Logo,
}

impl FromStr for OverlayKind {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "logo" => Ok(Self::Logo),
            _ => Err(INVALID_OVERLAY_KIND),
        }
    }
}

impl fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Logo => f.write_str("logo"),
        }
    }
}

/// A text or logo layer drawn over the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: OverlayKind,
    /// Text to draw, or the logo's image URL.
    pub content: String,
    pub x_position: f64,
    pub y_position: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: u32,
    pub font_color: String,
    pub background_color: String,
    pub opacity: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Overlay {
    pub fn new(name: String, kind: OverlayKind, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            name,
            kind,
            content: String::new(),
            x_position: 0.0,
            y_position: 0.0,
            width: 100.0,
            height: 50.0,
            font_size: 16,
            font_color: "#FFFFFF".to_string(),
            background_color: "transparent".to_string(),
            opacity: 1.0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the fields present in `fields`. The `type` field must
    /// already have been parsed into `kind` by the caller.
    pub fn apply(&mut self, fields: OverlayFields, kind: Option<OverlayKind>, now: DateTime<Utc>) {
        let OverlayFields {
            name,
            kind: _,
            content,
            x_position,
            y_position,
            width,
            height,
            font_size,
            font_color,
            background_color,
            opacity,
            is_active,
        } = fields;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(kind) = kind {
            self.kind = kind;
        }
        if let Some(content) = content {
            self.content = content;
        }
        if let Some(x_position) = x_position {
            self.x_position = x_position;
        }
        if let Some(y_position) = y_position {
            self.y_position = y_position;
        }
        if let Some(width) = width {
            self.width = width;
        }
        if let Some(height) = height {
            self.height = height;
        }
        if let Some(font_size) = font_size {
            self.font_size = font_size;
        }
        if let Some(font_color) = font_color {
            self.font_color = font_color;
        }
        if let Some(background_color) = background_color {
            self.background_color = background_color;
        }
        if let Some(opacity) = opacity {
            self.opacity = opacity;
        }
        if let Some(is_active) = is_active {
            self.is_active = is_active;
        }
        self.updated_at = now;
    }
}

impl Record for Overlay {
    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

/// Request body for creating or updating an [`Overlay`].
///
/// `type` stays a string so an unknown value can be answered with a
/// readable error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverlayFields {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub content: Option<String>,
    pub x_position: Option<f64>,
    pub y_position: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub font_size: Option<u32>,
    pub font_color: Option<String>,
    pub background_color: Option<String>,
    pub opacity: Option<f64>,
    pub is_active: Option<bool>,
}

impl OverlayFields {
    /// Parses the `type` field, if present.
    pub fn parse_kind(&self) -> Result<Option<OverlayKind>, &'static str> {
        self.kind.as_deref().map(str::parse).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overlay_kind_parse() {
        assert_eq!("text".parse::<OverlayKind>(), Ok(OverlayKind::Text));
        assert_eq!("logo".parse::<OverlayKind>(), Ok(OverlayKind::Logo));
        assert_eq!("Text".parse::<OverlayKind>(), Err(INVALID_OVERLAY_KIND));
        assert_eq!("image".parse::<OverlayKind>(), Err(INVALID_OVERLAY_KIND));
    }

    #[test]
    fn test_overlay_defaults_and_json_shape() {
        let overlay = Overlay::new("Watermark".into(), OverlayKind::Logo, Utc::now());
        let value = serde_json::to_value(&overlay).unwrap();

        assert_eq!(value["type"], "logo");
        assert_eq!(value["content"], "");
        assert_eq!(value["width"], 100.0);
        assert_eq!(value["height"], 50.0);
        assert_eq!(value["font_size"], 16);
        assert_eq!(value["font_color"], "#FFFFFF");
        assert_eq!(value["background_color"], "transparent");
        assert_eq!(value["opacity"], 1.0);
        assert_eq!(value["is_active"], true);
    }

    #[test]
    fn test_overlay_apply_partial() {
        let created = Utc::now();
        let mut overlay = Overlay::new("Title".into(), OverlayKind::Text, created);

        let fields: OverlayFields = serde_json::from_value(json!({
            "content": "LIVE",
            "x_position": 12.5,
            "font_size": 24,
            "type": "logo",
        }))
        .unwrap();
        let kind = fields.parse_kind().unwrap();
        let later = created + chrono::Duration::seconds(5);
        overlay.apply(fields, kind, later);

        assert_eq!(overlay.name, "Title");
        assert_eq!(overlay.kind, OverlayKind::Logo);
        assert_eq!(overlay.content, "LIVE");
        assert_eq!(overlay.x_position, 12.5);
        assert_eq!(overlay.y_position, 0.0);
        assert_eq!(overlay.font_size, 24);
        assert_eq!(overlay.created_at, created);
        assert_eq!(overlay.updated_at, later);
    }

    #[test]
    fn test_parse_kind_rejects_unknown() {
        let fields = OverlayFields {
            kind: Some("banner".into()),
            ..Default::default()
        };
        assert_eq!(fields.parse_kind(), Err(INVALID_OVERLAY_KIND));
        assert_eq!(OverlayFields::default().parse_kind(), Ok(None));
    }

    #[test]
    fn test_stream_setting_apply() {
        let now = Utc::now();
        let mut setting = StreamSetting::new("rtsp://a/1".into(), "Lobby".into(), true, now);
        setting.apply(
            StreamSettingFields {
                is_active: Some(false),
                ..Default::default()
            },
            now,
        );

        assert_eq!(setting.rtsp_url, "rtsp://a/1");
        assert_eq!(setting.stream_name, "Lobby");
        assert!(!setting.is_active);
    }
}
