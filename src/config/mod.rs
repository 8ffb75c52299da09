mod settings;

pub use settings::{
    ClaudeSettings, CodexSettings, Command, Config, ProviderChoice, Settings, WaybarSettings,
};
