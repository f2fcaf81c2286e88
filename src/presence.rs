//! Outbound presence: cursor sampling and participant colors.
//!
//! Joining a room is implicit in the connection itself — the server
//! registers presence from the connection's query string, so no join
//! frame is ever sent. What this module owns is the cursor feed:
//!
//! ```text
//! pointer move ──► CursorBroadcaster::update()
//!                        │  throttle (50 ms default)
//!                        ▼
//!                  cursor_move frame ──► outbound gate ──► socket
//! ```
//!
//! Raw pointer events arrive far faster than peers need to see them;
//! samples inside the throttle window are shed, and the next sample
//! after the window carries the latest position anyway. Sampling is a
//! subscription owned by the session and torn down with it — there is
//! no process-wide pointer listener.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::connection::{ConnectionState, Outbound};
use crate::protocol::{ClientMessage, CursorPoint};

// ───────────────────────────────────────────────────────────────────
// Cursor throttle
// ───────────────────────────────────────────────────────────────────

/// Rate limiter for outbound cursor samples.
///
/// The first sample passes immediately; afterwards at most one sample
/// per interval. Shed samples are gone for good — cursors are
/// last-write-wins, so there is nothing worth queueing.
#[derive(Debug)]
pub struct CursorTracker {
    last_broadcast: Instant,
    interval: Duration,
}

impl CursorTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            // Backdate so the first sample is never throttled.
            last_broadcast: Instant::now() - interval,
            interval,
        }
    }

    /// Admit or shed one cursor sample.
    pub fn sample(&mut self, x: f64, y: f64) -> Option<ClientMessage> {
        if self.last_broadcast.elapsed() < self.interval {
            return None;
        }
        self.last_broadcast = Instant::now();
        Some(ClientMessage::CursorMove {
            position: CursorPoint::new(x, y),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Throttled, connection-gated cursor feed.
pub struct CursorBroadcaster {
    outbound: Outbound,
    tracker: Mutex<CursorTracker>,
}

impl CursorBroadcaster {
    pub(crate) fn new(outbound: Outbound, interval: Duration) -> Self {
        Self {
            outbound,
            tracker: Mutex::new(CursorTracker::new(interval)),
        }
    }

    /// Feed one local pointer position. Returns whether a frame was
    /// actually sent; `false` covers both throttling and not being
    /// connected (neither is an error).
    pub fn update(&self, x: f64, y: f64) -> bool {
        if self.outbound.state() != ConnectionState::Connected {
            return false;
        }

        let intent = {
            let mut tracker = match self.tracker.lock() {
                Ok(tracker) => tracker,
                Err(poisoned) => poisoned.into_inner(),
            };
            tracker.sample(x, y)
        };

        match intent {
            Some(msg) => self.outbound.send(&msg),
            None => false,
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Participant colors
// ───────────────────────────────────────────────────────────────────

/// Stable RGBA color for a participant's avatar and cursor.
///
/// Derived from a hash of the opaque `user_id` through HSL with high
/// saturation, so every client renders the same user in the same vivid
/// color without any coordination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticipantColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ParticipantColor {
    pub fn from_user_id(user_id: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        let hue = (hasher.finish() % 360) as f32 / 360.0;

        let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.6);
        Self { r, g, b, a: 1.0 }
    }

    pub fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// `[r, g, b, a]` array for renderers.
    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

// ===================================================================
// Tests
// ===================================================================
