use std::fs;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    fs::create_dir_all(&settings.data_dir)?;
    save_settings(&settings)?;

    let db_path = std::path::Path::new(&settings.data_dir).join("cartera.db");
    let conn = get_connection(&db_path)?;
    init_db(&conn)?;

    println!("Initialized database at {}", db_path.display());
    println!("Default profiles seeded: conservative, moderate, aggressive");
    Ok(())
}
