//! Beat classification codes and their display labels.
//!
//! Codes 0..=41 are the standard MIT/WFDB annotation codes. 42..=45 are
//! vendor extensions written by the Holter recorder: lead-off changes,
//! patient events, and bracket markers that open or close an episode
//! (AF, bradycardia, pause, tachycardia) keyed by the subtype character.

use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AnnotationCode {
    NotQrs,
    Normal,
    Lbbb,
    Rbbb,
    Aberrant,
    Pvc,
    Fusion,
    Npc,
    Apc,
    Svpb,
    VentricularEscape,
    NodalEscape,
    Paced,
    Unknown,
    /// signal quality change; subtype != 0 opens a noisy stretch
    Noise,
    Artifact,
    StChange,
    TChange,
    Systole,
    Diastole,
    Note,
    Measure,
    PWave,
    Bbb,
    /// non-conducted pacer spike
    PacerSpike,
    TWave,
    Rhythm,
    UWave,
    Learn,
    FlutterWave,
    VfOnset,
    VfOffset,
    AtrialEscape,
    SupraventricularEscape,
    Link,
    NonConductedP,
    PacedFusion,
    WaveformOnset,
    WaveformEnd,
    ROnT,
    LeadOff,
    Event,
    EpisodeStart,
    EpisodeEnd,
    Other(u8),
}

impl AnnotationCode {
    pub fn from_code(code: u8) -> Self {
        use AnnotationCode::*;
        match code {
            0 => NotQrs,
            1 => Normal,
            2 => Lbbb,
            3 => Rbbb,
            4 => Aberrant,
            5 => Pvc,
            6 => Fusion,
            7 => Npc,
            8 => Apc,
            9 => Svpb,
            10 => VentricularEscape,
            11 => NodalEscape,
            12 => Paced,
            13 => Unknown,
            14 => Noise,
            16 => Artifact,
            18 => StChange,
            19 => TChange,
            20 => Systole,
            21 => Diastole,
            22 => Note,
            23 => Measure,
            24 => PWave,
            25 => Bbb,
            26 => PacerSpike,
            27 => TWave,
            28 => Rhythm,
            29 => UWave,
            30 => Learn,
            31 => FlutterWave,
            32 => VfOnset,
            33 => VfOffset,
            34 => AtrialEscape,
            35 => SupraventricularEscape,
            36 => Link,
            37 => NonConductedP,
            38 => PacedFusion,
            39 => WaveformOnset,
            40 => WaveformEnd,
            41 => ROnT,
            42 => LeadOff,
            43 => Event,
            44 => EpisodeStart,
            45 => EpisodeEnd,
            other => Other(other),
        }
    }

    pub fn code(self) -> u8 {
        use AnnotationCode::*;
        match self {
            NotQrs => 0,
            Normal => 1,
            Lbbb => 2,
            Rbbb => 3,
            Aberrant => 4,
            Pvc => 5,
            Fusion => 6,
            Npc => 7,
            Apc => 8,
            Svpb => 9,
            VentricularEscape => 10,
            NodalEscape => 11,
            Paced => 12,
            Unknown => 13,
            Noise => 14,
            Artifact => 16,
            StChange => 18,
            TChange => 19,
            Systole => 20,
            Diastole => 21,
            Note => 22,
            Measure => 23,
            PWave => 24,
            Bbb => 25,
            PacerSpike => 26,
            TWave => 27,
            Rhythm => 28,
            UWave => 29,
            Learn => 30,
            FlutterWave => 31,
            VfOnset => 32,
            VfOffset => 33,
            AtrialEscape => 34,
            SupraventricularEscape => 35,
            Link => 36,
            NonConductedP => 37,
            PacedFusion => 38,
            WaveformOnset => 39,
            WaveformEnd => 40,
            ROnT => 41,
            LeadOff => 42,
            Event => 43,
            EpisodeStart => 44,
            EpisodeEnd => 45,
            Other(code) => code,
        }
    }

    /// Beats skipped when looking for the previous beat of a real R-R interval.
    pub fn is_paced_or_rhythm(self) -> bool {
        matches!(self, AnnotationCode::Paced | AnnotationCode::Rhythm)
    }
}

impl From<u8> for AnnotationCode {
    fn from(code: u8) -> Self {
        AnnotationCode::from_code(code)
    }
}

/// Maps a code/subtype pair to its label. Never fails: unmapped codes
/// render as `[n]`.
pub fn classify(code: AnnotationCode, subtype: i8) -> Cow<'static, str> {
    use AnnotationCode::*;
    let label = match code {
        NotQrs => " ",
        Normal => "N",
        Lbbb => "LBBB",
        Rbbb => "RBBB",
        Aberrant => "ABERR",
        Pvc => "V",
        Fusion => "F",
        Npc => "NPC",
        Apc => "APC",
        Svpb => "S",
        VentricularEscape => "VESC",
        NodalEscape => "NESC",
        Paced => "|",
        Unknown => "?",
        Noise if subtype != 0 => "!(",
        Noise => ")!",
        Artifact => "ARFCT",
        StChange => "STCH",
        TChange => "TCH",
        Systole => "SYSTOLE",
        Diastole => "DIASTOLE",
        Note => "NOTE",
        Measure => "MEASURE",
        PWave => "PWAVE",
        Bbb => "BBB",
        PacerSpike => "PACESP",
        TWave => "TWAVE",
        Rhythm => "RHYTHM",
        UWave => "UWAVE",
        Learn => "LEARN",
        FlutterWave => "FLWAV",
        VfOnset => "VFON",
        VfOffset => "VFOFF",
        AtrialEscape => "AESC",
        SupraventricularEscape => "SVESC",
        Link => "LINK",
        NonConductedP => "NAPC",
        PacedFusion => "PFUS",
        WaveformOnset => "PQ",
        WaveformEnd => "JPT",
        ROnT => "RONT",
        LeadOff => return Cow::Owned(format!("LOFFx{}", signed_hex(subtype))),
        Event => "Ev",
        EpisodeStart => match episode_name(subtype) {
            Some(name) => return Cow::Owned(format!("{}(", name)),
            None => return Cow::Owned(format!("[{}](", subtype_char(subtype))),
        },
        EpisodeEnd => match episode_name(subtype) {
            Some(name) => return Cow::Owned(format!("){}", name)),
            None => return Cow::Owned(format!(")[{}]", subtype_char(subtype))),
        },
        Other(n) => return Cow::Owned(format!("[{}]", n)),
    };
    Cow::Borrowed(label)
}

fn episode_name(subtype: i8) -> Option<&'static str> {
    match subtype as u8 {
        b'a' => Some("AF"),
        b'b' => Some("B"),
        b'p' => Some("P"),
        b't' => Some("T"),
        _ => None,
    }
}

fn subtype_char(subtype: i8) -> char {
    char::from(subtype as u8)
}

fn signed_hex(value: i8) -> String {
    if value < 0 {
        format!("-{:x}", (value as i32).unsigned_abs())
    } else {
        format!("{:x}", value)
    }
}
