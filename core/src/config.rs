use clap::Parser;
use models::UserData;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "cloudshadow", about = "Remote drive shadow and fan-out daemon")]
pub struct CliConfig {
    /// Root directory for configuration, state and logs
    #[arg(long, default_value = "userdata")]
    pub userdata: PathBuf,

    /// Force a full tree rebuild at startup, ignoring the cached snapshot
    #[arg(long, default_value_t = false)]
    pub rebuild: bool,
}

impl CliConfig {
    pub fn into_userdata(self) -> (UserData, bool) {
        (UserData::new(self.userdata), self.rebuild)
    }
}
