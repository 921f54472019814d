pub mod settings;

pub use settings::{Settings, get_config_file_path, init_settings, load_settings, save_settings};
