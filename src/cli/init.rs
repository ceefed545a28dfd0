use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{database_in, expand_data_dir, load_settings, save_settings};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = expand_data_dir(&dir)?.to_string_lossy().into_owned();
    }
    save_settings(&settings)?;

    let resolved = std::path::PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;

    let conn = get_connection(&database_in(&resolved))?;
    init_db(&conn)?;

    println!("Initialized lebarone at {}", resolved.display());
    Ok(())
}
