//! Produce an Argon2 hash for the `auth.users` table.

use clap::Args;

use sentinel_auth::PasswordHasher;
use sentinel_core::error::AppError;

/// Arguments for `hash-password`
#[derive(Debug, Args)]
pub struct HashPasswordArgs {
    /// Password to hash; prompted for when omitted
    #[arg(long)]
    pub password: Option<String>,
}

/// Execute `hash-password`
pub fn execute(args: &HashPasswordArgs) -> Result<(), AppError> {
    let password = match &args.password {
        Some(password) => password.clone(),
        None => dialoguer::Password::new()
            .with_prompt("Password")
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()
            .map_err(|e| AppError::internal(format!("Input error: {}", e)))?,
    };

    let hash = PasswordHasher::new().hash_password(&password)?;
    println!("{}", hash);
    Ok(())
}
