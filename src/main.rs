use pagedb::Database;
use std::io::{self, BufRead, Write};

fn main() -> io::Result<()> {
    env_logger::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "pagedb.db".to_string());
    let mut db = Database::open(&path)?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{} open; get <k> | set <k> <v> | del <k> | exit", path)?;

    for line in stdin.lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("get"), Some(key), None) => match db.get(key.as_bytes()) {
                Some(val) => writeln!(out, "{}", String::from_utf8_lossy(&val))?,
                None => writeln!(out, "not found")?,
            },
            (Some("set"), Some(key), Some(val)) => {
                if let Err(err) = db.set(key.as_bytes(), val.as_bytes()) {
                    writeln!(out, "error in set: {}", err)?;
                }
            }
            (Some("del"), Some(key), None) => match db.del(key.as_bytes()) {
                Ok(deleted) => writeln!(out, "del {}", deleted)?,
                Err(err) => writeln!(out, "error in del: {}", err)?,
            },
            (Some("exit"), None, None) => break,
            (None, ..) => {}
            _ => writeln!(out, "usage: get <k> | set <k> <v> | del <k> | exit")?,
        }
        out.flush()?;
    }

    db.close();
    Ok(())
}
