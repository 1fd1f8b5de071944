mod config;

pub use config::{
    default_data_dir, get_data_dir, init_data_dir, load_settings, load_settings_from, save_settings,
    save_settings_to, EngineSettings, WebUrlDispatch,
};
