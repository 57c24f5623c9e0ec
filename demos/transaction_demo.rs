use burandb::{Database, DatabaseConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Creating database...");
    let db = Database::new(DatabaseConfig::new("transaction_demo_db"))?;
    db.recover()?;

    // Transaction 1 initializes a block.
    println!("\n--- Transaction 1: initialize ---");
    let mut t1 = db.new_tx()?;
    println!("Started transaction {}", t1.id());
    let blk = t1.append("demo.tbl")?;
    t1.pin(&blk)?;
    t1.set_int(&blk, 80, 1, false)?; // initial values need no undo record
    t1.set_string(&blk, 40, "one", false)?;
    t1.commit()?;
    println!("Committed: int 1 at offset 80, string \"one\" at offset 40");

    // Transaction 2 reads them and writes new values.
    println!("\n--- Transaction 2: update ---");
    let mut t2 = db.new_tx()?;
    t2.pin(&blk)?;
    let ival = t2.get_int(&blk, 80)?;
    let sval = t2.get_string(&blk, 40)?;
    println!("Read int {ival}, string {sval:?}");
    t2.set_int(&blk, 80, ival + 1, true)?;
    t2.set_string(&blk, 40, "one!", true)?;
    t2.commit()?;
    println!("Committed: int {}, string \"one!\"", ival + 1);

    // Transaction 3 modifies and thinks better of it.
    println!("\n--- Transaction 3: rollback ---");
    let mut t3 = db.new_tx()?;
    t3.pin(&blk)?;
    println!("Pre-rollback int is {}", t3.get_int(&blk, 80)?);
    t3.set_int(&blk, 80, 9999, true)?;
    println!("Set int to 9999, rolling back...");
    t3.rollback()?;

    let mut t4 = db.new_tx()?;
    t4.pin(&blk)?;
    println!("Post-rollback int is {}", t4.get_int(&blk, 80)?);
    t4.commit()?;

    Ok(())
}
