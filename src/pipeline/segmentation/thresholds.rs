use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Imaging source type. Selects the intensity threshold table used by the
/// segmentation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Ultrasound,
    T1Gd,
    OrCamera,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Ultrasound => "ultrasound",
            Modality::T1Gd => "t1_gd",
            Modality::OrCamera => "or_camera",
        }
    }

    /// Unknown names resolve to the OR camera table rather than erroring.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "ultrasound" | "usg" => Modality::Ultrasound,
            "t1_gd" | "t1gd" | "contrast_mri" => Modality::T1Gd,
            "or_camera" | "camera" => Modality::OrCamera,
            other => {
                tracing::warn!("Unknown modality '{other}', defaulting to or_camera");
                Modality::OrCamera
            }
        }
    }
}

/// An inclusive intensity band. A zero low bound means "everything below
/// high", i.e. the band is applied as an inverse threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntensityBand {
    pub low: u8,
    pub high: u8,
}

impl IntensityBand {
    pub const fn new(low: u8, high: u8) -> Self {
        Self { low, high }
    }

    pub fn is_inverse(&self) -> bool {
        self.low == 0
    }
}

/// Immutable per-modality mapping from structure name to intensity band.
/// Iteration order is the declaration order, which downstream consumers rely
/// on for stable mask and overlay ordering.
#[derive(Debug, Clone)]
pub struct ThresholdTable {
    bands: IndexMap<&'static str, IntensityBand>,
}

impl ThresholdTable {
    pub fn for_modality(modality: Modality) -> Self {
        let bands = match modality {
            Modality::Ultrasound => IndexMap::from([
                ("tumor", IntensityBand::new(160, 255)), // hyperechoic
                ("csf", IntensityBand::new(0, 40)),      // anechoic
                ("parenchyma", IntensityBand::new(50, 150)), // isoechoic
            ]),
            Modality::T1Gd => IndexMap::from([
                ("enhancement", IntensityBand::new(170, 255)),
                ("necrotic", IntensityBand::new(0, 45)),
                ("edema", IntensityBand::new(45, 85)),
                ("csf", IntensityBand::new(0, 35)),
                ("parenchyma", IntensityBand::new(85, 165)),
            ]),
            Modality::OrCamera => IndexMap::from([
                ("blood", IntensityBand::new(0, 80)),        // dark red
                ("tissue", IntensityBand::new(100, 200)),    // pink/red tissue
                ("instrument", IntensityBand::new(200, 255)), // metallic bright
            ]),
        };
        Self { bands }
    }

    pub fn get(&self, structure: &str) -> Option<IntensityBand> {
        self.bands.get(structure).copied()
    }

    pub fn structures(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.bands.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

/// Fixed overlay color per structure, RGB.
pub fn structure_color(structure: &str) -> Option<[u8; 3]> {
    match structure {
        "tumor" => Some([255, 80, 80]),
        "ventricles" | "csf" => Some([0, 150, 255]),
        "parenchyma" => Some([100, 200, 100]),
        "edema" => Some([100, 150, 255]),
        "enhancement" => Some([255, 200, 0]),
        "necrotic" => Some([150, 100, 200]),
        "blood" | "vessels" => Some([255, 0, 0]),
        "tissue" => Some([200, 140, 140]),
        "instrument" => Some([255, 0, 255]),
        _ => None,
    }
}
