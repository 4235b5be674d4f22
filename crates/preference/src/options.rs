use std::collections::BTreeMap;

use arcade_options::{BiosFile, ConfigValue, CoreName, EmulatorOptions, RomRef};

use crate::{Preference, PreferenceError};

/// Retroarch config every session starts from, before input mappings apply.
fn default_retroarch_config() -> BTreeMap<String, ConfigValue> {
    let mut config = BTreeMap::new();
    config.insert("fastforward_ratio".to_string(), ConfigValue::Int(10));
    // select
    config.insert("input_enable_hotkey_btn".to_string(), ConfigValue::Int(8));
    // R2
    config.insert("input_hold_fast_forward_btn".to_string(), ConfigValue::Int(7));
    for player in 1..=4 {
        config.insert(format!("input_player{player}_analog_dpad_mode"), ConfigValue::Int(1));
    }
    // L2
    config.insert("input_rewind_btn".to_string(), ConfigValue::Int(6));
    config.insert("rewind_enable".to_string(), true.into());
    config.insert("rewind_granularity".to_string(), ConfigValue::Int(4));
    config
}

/// Copy a mapping into retroarch config, skipping `$`-prefixed app hotkeys.
fn apply_mapping(config: &mut BTreeMap<String, ConfigValue>, mapping: &BTreeMap<String, String>) {
    for (key, value) in mapping {
        if key.starts_with('$') {
            continue;
        }
        config.insert(key.clone(), ConfigValue::Text(value.clone()));
    }
}

impl Preference {
    /// Build the options a session prepares its emulator with.
    ///
    /// `resume_state` points at a state file to boot from; `gamepad` selects
    /// which stored gamepad mapping applies.
    pub fn emulator_options(
        &self,
        rom: RomRef,
        platform: &str,
        resume_state: Option<String>,
        gamepad: Option<&str>,
    ) -> Result<EmulatorOptions, PreferenceError> {
        let platform_preference = self
            .platform(platform)
            .ok_or_else(|| PreferenceError::UnknownPlatform(platform.to_string()))?;
        let core = CoreName::new(platform_preference.core.clone());

        let mut retroarch_config = default_retroarch_config();
        apply_mapping(&mut retroarch_config, &self.input.keyboard_mapping);
        if let Some(mapping) = gamepad.and_then(|id| self.input.gamepad_mappings.get(id)) {
            apply_mapping(&mut retroarch_config, mapping);
        }
        retroarch_config.insert(
            "video_smooth".to_string(),
            self.emulator.video_smooth.into(),
        );

        Ok(EmulatorOptions {
            rom,
            bios: platform_preference
                .bioses
                .iter()
                .map(|bios| BiosFile {
                    file_name: bios.file_name.clone(),
                    location: bios.location.clone(),
                })
                .collect(),
            retroarch_config,
            core_config: self
                .emulator
                .core
                .get(core.as_str())
                .cloned()
                .unwrap_or_default(),
            shader: self.shader_for(platform),
            state: resume_state,
            core,
        })
    }
}
