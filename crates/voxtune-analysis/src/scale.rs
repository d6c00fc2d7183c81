//! Keys, scales and pitch quantization.
//!
//! Pitches are handled as continuous MIDI note numbers (A4 = 69.0). The
//! quantizer snaps a note to the nearest degree of a key-transposed scale,
//! measuring distance around the pitch-class circle so B→C counts as one
//! semitone.

use std::fmt;
use voxtune_core::{Error, Result};

/// Reference tuning.
pub const A4_HZ: f32 = 440.0;
pub const A4_MIDI: f32 = 69.0;

const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
const FLAT_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Tonic of the correction scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Key {
    #[default]
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl Key {
    pub const ALL: [Key; 12] = [
        Key::C,
        Key::CSharp,
        Key::D,
        Key::DSharp,
        Key::E,
        Key::F,
        Key::FSharp,
        Key::G,
        Key::GSharp,
        Key::A,
        Key::ASharp,
        Key::B,
    ];

    /// Semitone offset from C, `0..=11`.
    #[inline]
    pub fn offset(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: usize) -> Option<Key> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        SHARP_NAMES[self as usize]
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered semitone offsets within one octave.
///
/// Offsets are unique and in `0..=11`. Their order matters: when two degrees
/// are equally close, the quantizer picks the one listed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleDefinition {
    offsets: [u8; 12],
    len: usize,
}

impl ScaleDefinition {
    pub const MAJOR: ScaleDefinition = ScaleDefinition::preset([0, 2, 4, 5, 7, 9, 11, 0, 0, 0, 0, 0], 7);
    pub const MINOR: ScaleDefinition = ScaleDefinition::preset([0, 2, 3, 5, 7, 8, 10, 0, 0, 0, 0, 0], 7);
    pub const CHROMATIC: ScaleDefinition =
        ScaleDefinition::preset([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11], 12);

    const fn preset(offsets: [u8; 12], len: usize) -> Self {
        Self { offsets, len }
    }

    /// Build a custom scale, validating offsets.
    pub fn new(offsets: &[u8]) -> Result<Self> {
        if offsets.is_empty() || offsets.len() > 12 {
            return Err(Error::InvalidScale(format!(
                "expected 1 to 12 offsets, got {}",
                offsets.len()
            )));
        }

        let mut seen = [false; 12];
        let mut stored = [0u8; 12];
        for (i, &offset) in offsets.iter().enumerate() {
            if offset > 11 {
                return Err(Error::InvalidScale(format!(
                    "offset {offset} outside 0..=11"
                )));
            }
            if seen[offset as usize] {
                return Err(Error::InvalidScale(format!("duplicate offset {offset}")));
            }
            seen[offset as usize] = true;
            stored[i] = offset;
        }

        Ok(Self {
            offsets: stored,
            len: offsets.len(),
        })
    }

    #[inline]
    pub fn offsets(&self) -> &[u8] {
        &self.offsets[..self.len]
    }

    /// Whether `pitch_class` belongs to this scale transposed to `key`.
    pub fn contains(&self, key: Key, pitch_class: u8) -> bool {
        let pc = pitch_class % 12;
        self.offsets()
            .iter()
            .any(|&o| (o + key.offset()) % 12 == pc)
    }
}

/// Built-in scales selectable from the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Scale {
    #[default]
    Major,
    Minor,
    Chromatic,
}

impl Scale {
    pub const ALL: [Scale; 3] = [Scale::Major, Scale::Minor, Scale::Chromatic];

    pub fn from_index(index: usize) -> Option<Scale> {
        Self::ALL.get(index).copied()
    }

    pub fn definition(self) -> &'static ScaleDefinition {
        match self {
            Scale::Major => &ScaleDefinition::MAJOR,
            Scale::Minor => &ScaleDefinition::MINOR,
            Scale::Chromatic => &ScaleDefinition::CHROMATIC,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Scale::Major => "Major",
            Scale::Minor => "Minor",
            Scale::Chromatic => "Chromatic",
        }
    }
}

/// Snap a MIDI note to the nearest degree of `scale` transposed to `key`.
///
/// The note is rounded to the nearest semitone first. Distance is circular,
/// and a degree reached across the octave boundary lands in the adjacent
/// octave. Notes at or below 0 are returned unchanged.
pub fn quantize(midi_note: f32, key: Key, scale: &ScaleDefinition) -> f32 {
    if midi_note <= 0.0 || !midi_note.is_finite() {
        return midi_note;
    }

    let note = midi_note.round() as i32;
    let octave = note.div_euclid(12);
    let position = note.rem_euclid(12);

    let mut best = position;
    let mut best_distance = i32::MAX;
    for &offset in scale.offsets() {
        let degree = (offset as i32 + key.offset() as i32) % 12;
        let direct = (position - degree).abs();
        let distance = direct.min(12 - direct);
        if distance < best_distance {
            best_distance = distance;
            best = degree;
        }
    }

    // Wrapped across C
    let snapped = if best - position > 6 {
        best - 12
    } else if position - best > 6 {
        best + 12
    } else {
        best
    };

    (octave * 12 + snapped) as f32
}

/// `69 + 12·log2(f / 440)`; `None` for non-positive frequencies.
#[inline]
pub fn frequency_to_midi(frequency: f32) -> Option<f32> {
    if frequency <= 0.0 || !frequency.is_finite() {
        return None;
    }
    Some(A4_MIDI + 12.0 * (frequency / A4_HZ).log2())
}

/// `440·2^((m - 69) / 12)`.
#[inline]
pub fn midi_to_frequency(midi_note: f32) -> f32 {
    A4_HZ * 2.0f32.powf((midi_note - A4_MIDI) / 12.0)
}

/// Frequency ratio for a shift of `cents`.
#[inline]
pub fn cents_to_ratio(cents: f32) -> f32 {
    2.0f32.powf(cents / 1200.0)
}

/// Cents spanned by a frequency ratio.
#[inline]
pub fn ratio_to_cents(ratio: f32) -> f32 {
    1200.0 * ratio.log2()
}

/// Nearest-note name in sharp notation, e.g. "A4", "C#5".
pub fn note_name(midi_note: u8) -> String {
    let octave = (midi_note / 12) as i32 - 1;
    format!("{}{}", SHARP_NAMES[(midi_note % 12) as usize], octave)
}

/// Nearest-note name in flat notation, e.g. "A4", "Db5".
pub fn note_name_flat(midi_note: u8) -> String {
    let octave = (midi_note / 12) as i32 - 1;
    format!("{}{}", FLAT_NAMES[(midi_note % 12) as usize], octave)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_a440_on_scale_is_identity() {
        let midi = frequency_to_midi(440.0).unwrap();
        assert_abs_diff_eq!(midi, 69.0);
        assert_eq!(quantize(midi, Key::C, Scale::Major.definition()), 69.0);
    }

    #[test]
    fn test_snaps_to_nearest_degree() {
        let major = Scale::Major.definition();
        // D# (63) lies between D (62) and E (64): tie goes to the first listed degree
        assert_eq!(quantize(63.0, Key::C, major), 62.0);
        // F# (66) ties F (65) and G (67)
        assert_eq!(quantize(66.0, Key::C, major), 65.0);
        // Rounds before snapping
        assert_eq!(quantize(63.6, Key::C, major), 64.0);
    }

    #[test]
    fn test_key_transposition() {
        let major = Scale::Major.definition();
        // In G major F ties E and F#; E comes first in degree order
        assert_eq!(quantize(65.0, Key::G, major), 64.0);
        // G# (68) ties G and A; G is the tonic
        assert_eq!(quantize(68.0, Key::G, major), 67.0);
        assert_eq!(quantize(66.0, Key::G, major), 66.0);
        // A minor contains C
        assert_eq!(quantize(60.0, Key::A, Scale::Minor.definition()), 60.0);
    }

    #[test]
    fn test_octave_wrap_uses_adjacent_octave() {
        // Scale with only C: B3 (59) is one semitone below C4 (60)
        let only_c = ScaleDefinition::new(&[0]).unwrap();
        assert_eq!(quantize(59.0, Key::C, &only_c), 60.0);
        // C#4 (61) snaps down to C4
        assert_eq!(quantize(61.0, Key::C, &only_c), 60.0);
        // Key B, only tonic: C4 (60) snaps down to B3 (59)
        assert_eq!(quantize(60.0, Key::B, &only_c), 59.0);
    }

    #[test]
    fn test_chromatic_is_rounding() {
        let chromatic = Scale::Chromatic.definition();
        for n in 30..90 {
            let note = n as f32 + 0.3;
            assert_eq!(quantize(note, Key::D, chromatic), n as f32);
        }
    }

    #[test]
    fn test_non_positive_passthrough() {
        let major = Scale::Major.definition();
        assert_eq!(quantize(0.0, Key::C, major), 0.0);
        assert_eq!(quantize(-5.0, Key::C, major), -5.0);
        assert!(frequency_to_midi(0.0).is_none());
        assert!(frequency_to_midi(-1.0).is_none());
    }

    #[test]
    fn test_scale_validation() {
        assert!(ScaleDefinition::new(&[0, 4, 7]).is_ok());
        assert!(ScaleDefinition::new(&[]).is_err());
        assert!(ScaleDefinition::new(&[0, 12]).is_err());
        assert!(ScaleDefinition::new(&[0, 4, 4]).is_err());
        assert_eq!(ScaleDefinition::MINOR.offsets(), &[0, 2, 3, 5, 7, 8, 10]);
    }

    #[test]
    fn test_index_lookup() {
        assert_eq!(Key::from_index(9), Some(Key::A));
        assert_eq!(Key::from_index(12), None);
        assert_eq!(Scale::from_index(2), Some(Scale::Chromatic));
        assert_eq!(Key::FSharp.to_string(), "F#");
    }

    #[test]
    fn test_note_names() {
        assert_eq!(note_name(69), "A4");
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(61), "C#4");
        assert_eq!(note_name_flat(61), "Db4");
    }

    #[test]
    fn test_cents() {
        assert_abs_diff_eq!(cents_to_ratio(1200.0), 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(ratio_to_cents(2.0f32.powf(1.0 / 12.0)), 100.0, epsilon = 1e-3);
    }

    fn key_strategy() -> impl Strategy<Value = Key> {
        (0usize..12).prop_map(|i| Key::ALL[i])
    }

    fn scale_strategy() -> impl Strategy<Value = Scale> {
        (0usize..3).prop_map(|i| Scale::ALL[i])
    }

    proptest! {
        #[test]
        fn prop_quantized_note_is_in_scale(
            frequency in 60.0f32..1500.0,
            key in key_strategy(),
            scale in scale_strategy(),
        ) {
            let midi = frequency_to_midi(frequency).unwrap();
            let snapped = quantize(midi, key, scale.definition());
            prop_assert_eq!(snapped.fract(), 0.0);
            let pc = (snapped as i32).rem_euclid(12) as u8;
            prop_assert!(scale.definition().contains(key, pc));
            // Never more than a tritone away
            prop_assert!((snapped - midi.round()).abs() <= 6.0);
        }

        #[test]
        fn prop_midi_roundtrip(m in 36.0f32..96.0) {
            let back = frequency_to_midi(midi_to_frequency(m)).unwrap();
            prop_assert!((back - m).abs() < 0.01);
        }

        #[test]
        fn prop_frequency_roundtrip(f in 60.0f32..2000.0) {
            let back = midi_to_frequency(frequency_to_midi(f).unwrap());
            prop_assert!((back - f).abs() / f < 1e-4);
        }
    }
}
