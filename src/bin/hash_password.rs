//! Prints an scrypt hash for use in `ADMIN_CREDENTIALS` or `ADMIN_PASSWORD`.
//!
//! Usage: `hash-password <password>`

use anyhow::Context;
use zeroize::Zeroizing;

use investing_garden::crypto::password::hash_password;

fn main() -> anyhow::Result<()> {
    let password = Zeroizing::new(
        std::env::args()
            .nth(1)
            .context("usage: hash-password <password>")?,
    );
    if password.chars().count() < 8 {
        anyhow::bail!("password must be at least 8 characters");
    }

    let hash = hash_password(&password).context("failed to hash password")?;
    println!("{}", hash);
    Ok(())
}
