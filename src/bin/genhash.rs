//! Print a SHA-512 crypt hash for `auth.users[].password_hash`
//!
//! Usage: `genhash <password>`, or `genhash` and type the password on stdin
//! to keep it out of shell history.

use std::io::BufRead;

fn main() -> anyhow::Result<()> {
    let password = match std::env::args().nth(1) {
        Some(password) => password,
        None => {
            eprintln!("Password (read from stdin):");
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }

    println!("{}", yardgate::auth::hash_password(&password)?);
    Ok(())
}
