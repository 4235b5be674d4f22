use std::collections::BTreeMap;

use crate::{EmulatorPreference, InputPreference, PlatformPreference, Preference};

/// Platforms shown by default, with the core each one starts on.
const PLATFORM_CORES: &[(&str, &str)] = &[
    ("arcade", "mame2003_plus"),
    ("atari2600", "stella2014"),
    ("gb", "mgba"),
    ("gba", "mgba"),
    ("gbc", "mgba"),
    ("genesis", "genesis_plus_gx"),
    ("nes", "fceumm"),
    ("snes", "snes9x"),
];

const CORE_OPTIONS: &[(&str, &[(&str, &str)])] = &[
    ("fceumm", &[("fceumm_turbo_enable", "Both")]),
    (
        "mame2003_plus",
        &[("mame2003-plus_skip_disclaimer", "enabled")],
    ),
    (
        "mgba",
        &[("mgba_gb_colors", "DMG Green"), ("mgba_skip_bios", "ON")],
    ),
];

const KEYBOARD_MAPPING: &[(&str, &str)] = &[
    ("$pause", "escape"),
    ("input_hold_fast_forward", "space"),
    ("input_player1_a", "x"),
    ("input_player1_b", "z"),
    ("input_player1_down", "down"),
    ("input_player1_l1", "q"),
    ("input_player1_l2", ""),
    ("input_player1_l3", ""),
    ("input_player1_left", "left"),
    ("input_player1_r1", "w"),
    ("input_player1_r2", ""),
    ("input_player1_r3", ""),
    ("input_player1_right", "right"),
    ("input_player1_select", "rshift"),
    ("input_player1_start", "enter"),
    ("input_player1_up", "up"),
    ("input_player1_x", "s"),
    ("input_player1_y", "a"),
    ("input_rewind", "r"),
];

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for EmulatorPreference {
    fn default() -> Self {
        Self {
            auto_save_interval: 300,
            core: CORE_OPTIONS
                .iter()
                .map(|(core, options)| (core.to_string(), string_map(options)))
                .collect(),
            fullscreen: false,
            mute: false,
            platform: PLATFORM_CORES
                .iter()
                .map(|(platform, core)| {
                    (
                        platform.to_string(),
                        PlatformPreference {
                            bioses: Vec::new(),
                            core: core.to_string(),
                            shader: Some("inherit".to_string()),
                        },
                    )
                })
                .collect(),
            shader: String::new(),
            video_smooth: false,
        }
    }
}

impl Default for InputPreference {
    fn default() -> Self {
        Self {
            confirm_button_style: "nintendo".to_string(),
            gamepad_mappings: BTreeMap::new(),
            keyboard_mapping: string_map(KEYBOARD_MAPPING),
        }
    }
}

impl Default for Preference {
    fn default() -> Self {
        Self {
            emulator: EmulatorPreference::default(),
            input: InputPreference::default(),
        }
    }
}
