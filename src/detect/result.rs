use serde::Deserialize;

/// Detected card region in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    /// Build from `[x1, y1, x2, y2]`. Fewer than four values means no box.
    pub fn from_slice(coords: &[f64]) -> Option<Self> {
        match coords {
            [x1, y1, x2, y2, ..] => Some(Self {
                x1: *x1,
                y1: *y1,
                x2: *x2,
                y2: *y2,
            }),
            _ => None,
        }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }
}

/// Identity fields extracted from the card.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityFields {
    pub nim: Option<String>,
    pub name: Option<String>,
}

impl IdentityFields {
    pub fn nim(&self) -> Option<&str> {
        non_empty(self.nim.as_deref())
    }

    pub fn name(&self) -> Option<&str> {
        non_empty(self.name.as_deref())
    }

    /// Both required fields present and non-empty.
    pub fn is_complete(&self) -> bool {
        self.nim().is_some() && self.name().is_some()
    }
}

/// Result of one recognition call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Detection {
    pub bbox: Option<BoundingBox>,
    pub fields: Option<IdentityFields>,
    /// Extraction score, 0..=100.
    pub confidence: f64,
}

impl Detection {
    /// Interpret a scan reply. Any status other than "success" is no detection.
    pub fn from_reply(reply: &ScanReply) -> Option<Self> {
        if !reply.is_success() {
            return None;
        }
        Some(Self::from_reply_data(reply))
    }

    /// Interpret a scan reply regardless of its status.
    pub fn from_reply_data(reply: &ScanReply) -> Self {
        let bbox = reply
            .bbox
            .as_deref()
            .and_then(BoundingBox::from_slice);
        let fields = reply.data.as_ref().map(|data| IdentityFields {
            nim: data.nim.clone(),
            name: data.name.clone(),
        });
        let confidence = reply
            .data
            .as_ref()
            .and_then(|data| data.accuracy)
            .filter(|acc| acc.is_finite())
            .unwrap_or(0.0);
        Self {
            bbox,
            fields,
            confidence,
        }
    }
}

/// JSON body returned by the recognition endpoint.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ScanReply {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    #[serde(default)]
    pub data: Option<ScanData>,
    #[serde(default)]
    pub debug_raw_text: Option<serde_json::Value>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ScanReply {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ScanData {
    #[serde(default)]
    pub nim: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub faculty_code: Option<String>,
    #[serde(default)]
    pub raw_text: Option<Vec<String>>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
