use toml::{Table, Value};

use crate::{Preference, PreferenceError};

/// Deep-merge `overlay` into `base`. Tables merge key by key; any other value
/// in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

impl Preference {
    /// Resolve a partial user preference against the defaults.
    ///
    /// A user keyboard mapping replaces the default mapping instead of being
    /// merged into it, so unbinding a key does not bring the default back.
    pub fn resolve(user: Option<Table>) -> Result<Self, PreferenceError> {
        let Some(user) = user else {
            return Ok(Self::default());
        };

        let mut base = match Value::try_from(Self::default())? {
            Value::Table(table) => table,
            _ => Table::new(),
        };

        let user_has_keyboard_mapping = user
            .get("input")
            .and_then(Value::as_table)
            .is_some_and(|input| input.contains_key("keyboard_mapping"));
        if user_has_keyboard_mapping {
            if let Some(Value::Table(input)) = base.get_mut("input") {
                input.remove("keyboard_mapping");
            }
        }

        merge_tables(&mut base, user);
        Ok(Value::Table(base).try_into()?)
    }
}
