//! Friendly app-name resolution for activate/terminate actions.

use std::collections::HashMap;

use uiscout_core_types::Platform;

/// Per-platform tables mapping friendly app names to package/bundle ids.
///
/// Injectable per run so deployments can register their own apps; the
/// builtin table covers the handful of system apps tasks keep reaching for.
#[derive(Debug, Clone, Default)]
pub struct AppAliases {
    pub android: HashMap<String, String>,
    pub ios: HashMap<String, String>,
}

impl AppAliases {
    pub fn builtin() -> Self {
        let android = [
            ("settings", "com.android.settings"),
            ("chrome", "com.android.chrome"),
            ("camera", "com.android.camera"),
            ("contacts", "com.android.contacts"),
            ("messages", "com.google.android.apps.messaging"),
        ];
        let ios = [
            ("settings", "com.apple.Preferences"),
            ("safari", "com.apple.mobilesafari"),
            ("camera", "com.apple.camera"),
            ("contacts", "com.apple.MobileAddressBook"),
            ("messages", "com.apple.MobileSMS"),
        ];
        Self {
            android: android
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ios: ios
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Map a friendly name to its platform identifier; unknown names pass
    /// through untouched so raw package/bundle ids always work.
    pub fn resolve(&self, platform: Platform, name: &str) -> String {
        let table = match platform {
            Platform::Android => &self.android,
            Platform::Ios => &self.ios,
            Platform::Web => return name.to_string(),
        };
        table
            .get(&name.trim().to_lowercase())
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friendly_names_map_per_platform() {
        let apps = AppAliases::builtin();
        assert_eq!(
            apps.resolve(Platform::Android, "Settings"),
            "com.android.settings"
        );
        assert_eq!(
            apps.resolve(Platform::Ios, "settings"),
            "com.apple.Preferences"
        );
    }

    #[test]
    fn raw_ids_pass_through() {
        let apps = AppAliases::builtin();
        assert_eq!(
            apps.resolve(Platform::Android, "com.example.app"),
            "com.example.app"
        );
        assert_eq!(apps.resolve(Platform::Web, "settings"), "settings");
    }
}
