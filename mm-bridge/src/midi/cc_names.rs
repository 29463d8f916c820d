//! Controller names and console shortcuts

const CC_NAMES: &[(u8, &str)] = &[
    (0, "Bank Select MSB"),
    (1, "Modulation"),
    (2, "Breath"),
    (4, "Foot Controller"),
    (5, "Portamento Time"),
    (7, "Volume"),
    (10, "Pan"),
    (11, "Expression"),
    (64, "Sustain"),
    (65, "Portamento"),
    (66, "Sostenuto"),
    (67, "Soft Pedal"),
    (71, "Resonance"),
    (72, "Release"),
    (73, "Attack"),
    (74, "Cutoff"),
    (91, "Reverb"),
    (93, "Chorus"),
    (120, "All Sound Off"),
    (121, "Reset All"),
    (123, "All Notes Off"),
];

/// Display name of a controller, `CC<n>` when it has none
pub fn cc_name(cc: u8) -> String {
    CC_NAMES
        .iter()
        .find(|(n, _)| *n == cc)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("CC{}", cc))
}

/// Controller behind a named shortcut (`cutoff`, `pan`, ...)
pub fn shortcut_cc(name: &str) -> Option<u8> {
    match name.to_ascii_lowercase().as_str() {
        "cutoff" | "brightness" => Some(74),
        "resonance" => Some(71),
        "attack" => Some(73),
        "release" => Some(72),
        "volume" => Some(7),
        "pan" => Some(10),
        "mod" | "modulation" => Some(1),
        _ => None,
    }
}
