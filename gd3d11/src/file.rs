use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use derive_new::new;
use gd3d11_lib::engine::EngineSettings;
use tracing::{error, info};

pub const SETTINGS_FILE_NAME: &str = "GD3D11.toml";

#[cfg(all(windows, target_arch = "x86"))]
pub fn to_dll_path(module: windows::Win32::Foundation::HMODULE) -> Result<PathBuf> {
    use anyhow::bail;
    use windows::{
        core::PCWSTR, Win32::Foundation::MAX_PATH,
        Win32::System::LibraryLoader::GetModuleFileNameW,
    };

    let mut buf = [0u16; MAX_PATH as usize];
    if unsafe { GetModuleFileNameW(module, &mut buf) } == 0 {
        bail!("GetModuleFileNameW failed");
    }
    let dll_path = unsafe { PCWSTR::from_raw(buf.as_ptr()).to_string() }?;
    Ok(PathBuf::from(dll_path))
}

/// `GD3D11.toml` beside the DLL.
#[derive(new)]
pub struct SettingsRepo {
    path: PathBuf,
}

impl SettingsRepo {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing file is created with the defaults and a broken
    /// one is left alone.
    pub fn load(&self) -> EngineSettings {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let settings = EngineSettings::default();
                match self.save(&settings) {
                    Ok(()) => info!("wrote default settings to {}", self.path.display()),
                    Err(err) => error!("{}: {}", self.path.display(), err),
                }
                return settings;
            }
            Err(err) => {
                error!("{}: {}", self.path.display(), err);
                return EngineSettings::default();
            }
        };
        match toml::from_str(&text) {
            Ok(settings) => settings,
            Err(err) => {
                error!("{}: {}", self.path.display(), err);
                EngineSettings::default()
            }
        }
    }

    pub fn save(&self, settings: &EngineSettings) -> Result<()> {
        fs::write(&self.path, toml::to_string(settings)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(test_name: &str) -> SettingsRepo {
        let dir = std::env::temp_dir().join(format!(
            "gd3d11-{}-{}",
            std::process::id(),
            test_name
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        SettingsRepo::new(dir.join(SETTINGS_FILE_NAME))
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let repo = repo("missing");
        assert_eq!(repo.load(), EngineSettings::default());
        let written = fs::read_to_string(repo.path()).unwrap();
        assert_eq!(
            toml::from_str::<EngineSettings>(&written).unwrap(),
            EngineSettings::default()
        );
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let repo = repo("malformed");
        fs::write(repo.path(), "vsync = \"sometimes\"\n[[").unwrap();
        assert_eq!(repo.load(), EngineSettings::default());
        assert!(fs::read_to_string(repo.path()).unwrap().contains("sometimes"));
    }

    #[test]
    fn saved_settings_load_back() {
        let repo = repo("saved");
        let settings = EngineSettings {
            vsync: false,
            resolution_override: Some([1280, 720]),
            shadow_map_size: 4096,
            ..Default::default()
        };
        repo.save(&settings).unwrap();
        assert_eq!(repo.load(), settings);
    }
}
