use anyhow::Result;
use sesio::cli::{actions, actions::Action, start};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    // Start the program
    let action = start()?;

    // Handle the action
    match action {
        Action::Server(args) => actions::server::execute(*args).await?,
    }

    Ok(())
}
