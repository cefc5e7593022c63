use serde::{Deserialize, Serialize};

pub type ConnectionId = u64;
pub type RoomId = String;

/// Room joined by clients that don't name one.
pub const DEFAULT_ROOM: &str = "lobby";

/// Client-supplied identity. Untrusted and opaque: never used for
/// authorization, only echoed back in presence snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub name: String,
    pub color: String,
}

impl UserIdentity {
    /// Identity bound to connections whose `hello` carried no user payload.
    pub fn anonymous() -> Self {
        let uuid = uuid::Uuid::new_v4().to_simple().to_string();
        Self {
            id: format!("u_{}", &uuid[..8]),
            name: "anon".into(),
            color: "#888".into(),
        }
    }
}

/// An immutable line segment. Room history is the linear composition of
/// these in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub color: String,
    pub size: f32,
}

impl Stroke {
    /// Boundary validation: every numeric field finite, size positive, color
    /// a plausible CSS token. Rejected strokes never reach a room's history.
    pub fn is_well_formed(&self) -> bool {
        self.x0.is_finite()
            && self.y0.is_finite()
            && self.x1.is_finite()
            && self.y1.is_finite()
            && self.size.is_finite()
            && self.size > 0.0
            && is_plausible_color(&self.color)
    }
}

/// Accepts `#rgb`/`#rgba`/`#rrggbb`/`#rrggbbaa` hex forms and short
/// alphabetic names like `teal`. Everything else is implausible.
pub fn is_plausible_color(token: &str) -> bool {
    if let Some(hex) = token.strip_prefix('#') {
        matches!(hex.len(), 3 | 4 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
    } else {
        !token.is_empty() && token.len() <= 24 && token.chars().all(|c| c.is_ascii_alphabetic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke() -> Stroke {
        Stroke {
            x0: 0.0,
            y0: 0.0,
            x1: 10.0,
            y1: 10.0,
            color: "#000".into(),
            size: 2.0,
        }
    }

    #[test]
    fn it_accepts_a_plain_stroke() {
        assert!(stroke().is_well_formed());
    }

    #[test]
    fn it_rejects_non_finite_coordinates() {
        let mut s = stroke();
        s.x1 = f32::NAN;
        assert!(!s.is_well_formed());

        let mut s = stroke();
        s.y0 = f32::INFINITY;
        assert!(!s.is_well_formed());
    }

    #[test]
    fn it_rejects_non_positive_or_non_finite_size() {
        let mut s = stroke();
        s.size = 0.0;
        assert!(!s.is_well_formed());

        s.size = -1.0;
        assert!(!s.is_well_formed());

        s.size = f32::NAN;
        assert!(!s.is_well_formed());
    }

    #[test]
    fn it_judges_color_plausibility() {
        assert!(is_plausible_color("#fff"));
        assert!(is_plausible_color("#1a2b3c"));
        assert!(is_plausible_color("#1a2b3c4d"));
        assert!(is_plausible_color("rebeccapurple"));
        assert!(!is_plausible_color(""));
        assert!(!is_plausible_color("#12345"));
        assert!(!is_plausible_color("#ggg"));
        assert!(!is_plausible_color("url(javascript:alert(1))"));
    }

    #[test]
    fn it_generates_distinct_anonymous_identities() {
        let a = UserIdentity::anonymous();
        let b = UserIdentity::anonymous();
        assert!(a.id.starts_with("u_"));
        assert_ne!(a.id, b.id);
        assert_eq!(a.name, "anon");
    }
}
