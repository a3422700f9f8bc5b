use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::store::MetricsStore;
use clap::Parser;
use std::io::Write;

#[derive(Parser, Debug)]
pub struct UsersArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Print every user with a recorded run, or the default user if there are none.
pub async fn list_users<H: Host>(host: &mut H, args: &UsersArgs) -> Result<()> {
    let common = Common::new(&args.common)?;
    let store = common.open_store().await?;

    let users = store.list_users().await?;
    for user in users {
        let _ = writeln!(host.output(), "{user}");
    }

    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::commands::common::{ColorMode, LogLevel};
    use crate::commands::host::TestHost;
    use crate::store::FileStore;
    use camino::Utf8PathBuf;

    fn args(dir: &Utf8PathBuf) -> UsersArgs {
        let config = dir.join("life-stats.toml");
        std::fs::write(&config, "default_user = \"me\"\n").unwrap();

        UsersArgs {
            common: CommonArgs {
                config: Some(config),
                data_dir: Some(dir.join("data")),
                color: ColorMode::Never,
                log_level: LogLevel::None,
            },
        }
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    async fn test_empty_store_lists_default_user() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();

        let mut host = TestHost::new();
        list_users(&mut host, &args(&dir)).await.unwrap();
        assert_eq!(host.output_text(), "me\n");
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    async fn test_lists_users_with_runs() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();

        {
            let store = FileStore::open(dir.join("data"), "me").await.unwrap();
            let _ = store.update_last_run("bob", "steps").await.unwrap();
            let _ = store.update_last_run("alice", "weather").await.unwrap();
        }

        let mut host = TestHost::new();
        list_users(&mut host, &args(&dir)).await.unwrap();
        assert_eq!(host.output_text(), "alice\nbob\n");
    }
}
