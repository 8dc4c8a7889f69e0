//! Per-pixel colour predicates.
//!
//! Each [`PixelClass`] owns several independent heuristic profiles. A pixel
//! belongs to the class when any profile fires; the reported confidence is the
//! highest among the firing profiles. Rigid single thresholds miss worn balls
//! and harsh lighting, so recall is favoured here and clustering downstream
//! rejects isolated hits.

/// Hard ceiling on any per-pixel confidence.
pub const MAX_PIXEL_CONFIDENCE: f32 = 0.95;

/// Derived colour features of one RGB pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelFeatures {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    /// Mean channel value, 0..255.
    pub brightness: f32,
    /// (max - min) / max, 0..1.
    pub saturation: f32,
    /// How far red+green sit above blue, may be negative.
    pub yellowness: f32,
}

impl PixelFeatures {
    pub fn from_rgb([r, g, b]: [u8; 3]) -> Self {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        Self {
            r,
            g,
            b,
            brightness: (r + g + b) / 3.0,
            saturation: if max > 0.0 { (max - min) / max } else { 0.0 },
            yellowness: (r + g) / 2.0 - b,
        }
    }

    /// Rec. 709 luminance
    pub fn luma(&self) -> f32 {
        0.2126 * self.r + 0.7152 * self.g + 0.0722 * self.b
    }
}

/// Target classes the detectors look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelClass {
    /// Fluorescent yellow-green ball felt.
    Projectile,
    /// Dark implement frame.
    ImplementFrame,
    /// Bright string bed.
    ImplementStrings,
    /// Mid-dark grip.
    ImplementHandle,
    Skin,
    /// Light or strongly coloured athletic clothing.
    Clothing,
    Hair,
}

/// One heuristic colour profile.
pub struct ColorProfile {
    pub name: &'static str,
    score: fn(&PixelFeatures) -> Option<f32>,
    ceiling: f32,
}

impl ColorProfile {
    pub fn evaluate(&self, features: &PixelFeatures) -> Option<f32> {
        (self.score)(features).map(|c| c.clamp(0.0, self.ceiling))
    }
}

/// Result of classifying a single pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelMatch {
    pub is_match: bool,
    /// Normalized brightness, 0..1.
    pub intensity: f32,
    pub confidence: f32,
    pub profile: Option<&'static str>,
}

// Projectile profiles.
//
// bright-yellow-green: g >= 150, r >= 120, b <= 120, yellowness >= 80; confidence 0.3..0.95
// worn:                r, g >= 140, b <= 150, g - b >= 40, |r - g| <= 70; confidence 0.3..0.85
// high-contrast:       brightness >= 200, r - b >= 30, g - b >= 30; confidence 0.4..0.8
// low-saturation:      brightness >= 180, saturation <= 0.35, g - b >= 15, r - b >= 10; confidence 0.3..0.6
static PROJECTILE_PROFILES: [ColorProfile; 4] = [
    ColorProfile {
        name: "bright-yellow-green",
        score: |p| {
            (p.g >= 150.0 && p.r >= 120.0 && p.b <= 120.0 && p.yellowness >= 80.0)
                .then(|| 0.6 * (p.yellowness / 255.0) + 0.4 * (p.brightness / 255.0))
        },
        ceiling: 0.95,
    },
    ColorProfile {
        name: "worn",
        score: |p| {
            (p.r >= 140.0
                && p.g >= 140.0
                && p.b <= 150.0
                && p.g - p.b >= 40.0
                && (p.r - p.g).abs() <= 70.0)
                .then(|| 0.1 + 0.5 * (p.yellowness / 255.0) + 0.3 * (p.brightness / 255.0))
        },
        ceiling: 0.85,
    },
    ColorProfile {
        name: "high-contrast",
        score: |p| {
            (p.brightness >= 200.0 && p.r - p.b >= 30.0 && p.g - p.b >= 30.0)
                .then(|| 0.4 + 0.4 * ((p.g - p.b) / 255.0))
        },
        ceiling: 0.8,
    },
    ColorProfile {
        name: "low-saturation",
        score: |p| {
            (p.brightness >= 180.0
                && p.saturation <= 0.35
                && p.g - p.b >= 15.0
                && p.r - p.b >= 10.0)
                .then(|| 0.3 + 0.3 * ((p.brightness - 180.0) / 75.0))
        },
        ceiling: 0.6,
    },
];

static IMPLEMENT_FRAME_PROFILES: [ColorProfile; 1] = [ColorProfile {
    name: "dark-frame",
    score: |p| (p.brightness < 70.0).then(|| 0.5 + 0.4 * (1.0 - p.brightness / 70.0)),
    ceiling: 0.9,
}];

static IMPLEMENT_STRINGS_PROFILES: [ColorProfile; 2] = [
    ColorProfile {
        name: "white-strings",
        score: |p| {
            (p.brightness >= 170.0 && p.saturation <= 0.25)
                .then(|| 0.4 + 0.5 * (p.brightness / 255.0))
        },
        ceiling: 0.9,
    },
    ColorProfile {
        name: "yellow-strings",
        score: |p| {
            (p.brightness >= 150.0 && p.yellowness >= 60.0)
                .then(|| 0.35 + 0.4 * (p.yellowness / 255.0))
        },
        ceiling: 0.8,
    },
];

static IMPLEMENT_HANDLE_PROFILES: [ColorProfile; 1] = [ColorProfile {
    name: "grip",
    score: |p| {
        (p.brightness >= 50.0 && p.brightness < 130.0 && p.saturation <= 0.35)
            .then(|| 0.5 + 0.2 * (1.0 - p.saturation / 0.35))
    },
    ceiling: 0.7,
}];

static SKIN_PROFILES: [ColorProfile; 1] = [ColorProfile {
    name: "skin",
    score: |p| {
        let max = p.r.max(p.g).max(p.b);
        let min = p.r.min(p.g).min(p.b);
        (p.r > 95.0
            && p.g > 40.0
            && p.b > 20.0
            && max - min > 15.0
            && (p.r - p.g).abs() > 15.0
            && p.r > p.g
            && p.r > p.b)
            .then(|| 0.5 + 0.4 * ((p.r - p.g) / 100.0).min(1.0))
    },
    ceiling: 0.9,
}];

static CLOTHING_PROFILES: [ColorProfile; 2] = [
    ColorProfile {
        name: "light-kit",
        score: |p| {
            (p.brightness >= 170.0 && p.saturation <= 0.2)
                .then(|| 0.4 + 0.4 * (p.brightness / 255.0))
        },
        ceiling: 0.85,
    },
    ColorProfile {
        name: "saturated-kit",
        score: |p| (p.brightness >= 90.0 && p.saturation >= 0.6).then_some(0.45),
        ceiling: 0.5,
    },
];

static HAIR_PROFILES: [ColorProfile; 1] = [ColorProfile {
    name: "dark-hair",
    score: |p| {
        (p.brightness >= 15.0 && p.brightness < 60.0 && p.r > p.b + 5.0 && p.saturation <= 0.6)
            .then(|| 0.4 + 0.2 * (1.0 - p.brightness / 60.0))
    },
    ceiling: 0.6,
}];

impl PixelClass {
    pub fn profiles(&self) -> &'static [ColorProfile] {
        match self {
            PixelClass::Projectile => &PROJECTILE_PROFILES,
            PixelClass::ImplementFrame => &IMPLEMENT_FRAME_PROFILES,
            PixelClass::ImplementStrings => &IMPLEMENT_STRINGS_PROFILES,
            PixelClass::ImplementHandle => &IMPLEMENT_HANDLE_PROFILES,
            PixelClass::Skin => &SKIN_PROFILES,
            PixelClass::Clothing => &CLOTHING_PROFILES,
            PixelClass::Hair => &HAIR_PROFILES,
        }
    }
}

/// Classify a pixel against one class.
pub fn classify(class: PixelClass, rgb: [u8; 3]) -> PixelMatch {
    classify_features(class, &PixelFeatures::from_rgb(rgb))
}

pub fn classify_features(class: PixelClass, features: &PixelFeatures) -> PixelMatch {
    let mut best: Option<(&'static str, f32)> = None;
    for profile in class.profiles() {
        if let Some(confidence) = profile.evaluate(features) {
            if best.map(|(_, c)| confidence > c).unwrap_or(true) {
                best = Some((profile.name, confidence));
            }
        }
    }

    let intensity = features.brightness / 255.0;
    match best {
        Some((name, confidence)) => PixelMatch {
            is_match: true,
            intensity,
            confidence: confidence.clamp(0.0, MAX_PIXEL_CONFIDENCE),
            profile: Some(name),
        },
        None => PixelMatch {
            is_match: false,
            intensity,
            confidence: 0.0,
            profile: None,
        },
    }
}
