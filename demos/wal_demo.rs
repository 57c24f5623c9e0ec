use burandb::{Database, DatabaseConfig, Page};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Creating database...");
    let config = DatabaseConfig::new("wal_demo_db");
    let db = Database::new(config)?;

    println!("Appending 40 log records...");
    for n in 1..=40 {
        let message = format!("record{n}");
        let npos = Page::max_length(message.len());
        let mut page = Page::from_bytes(vec![0; npos + 4]);
        page.set_string(0, &message);
        page.set_int(npos, n + 100);
        let lsn = db.log_manager().append(&page.into_bytes())?;
        if n % 10 == 0 {
            println!("  appended {message} at LSN {lsn}");
        }
    }

    println!("Flushing and reading the log back, newest first:");
    for bytes in db.log_manager().iterator()? {
        let page = Page::from_bytes(bytes?);
        let message = page.get_string(0);
        let value = page.get_int(Page::max_length(message.len()));
        println!("  [{message}, {value}]");
    }

    println!("Done.");
    Ok(())
}
