//! Subcommand handlers.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use shopfront_core::api::RegisterInput;
use shopfront_core::auth::{route_decision, Access, RouteDecision};
use shopfront_core::{Config, GraphQLClient, GraphQLRequest, User};

/// Non-interactive password source for scripts
const PASSWORD_ENV: &str = "SHOPFRONT_PASSWORD";

pub async fn login(client: &GraphQLClient, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    if email.is_empty() {
        bail!("Email cannot be empty");
    }

    let password = read_password("Password: ")?;
    let user = client.login(&email, &password).await.context("Login failed")?;

    remember_email(config, email);
    println!("Logged in as {}", describe(&user));
    Ok(())
}

pub async fn register(client: &GraphQLClient, config: &mut Config, email: String, name: String) -> Result<()> {
    let password = read_password("Choose a password: ")?;
    if std::env::var_os(PASSWORD_ENV).is_none() {
        let confirm = read_password("Confirm password: ")?;
        if confirm.expose_secret() != password.expose_secret() {
            bail!("Passwords do not match");
        }
    }

    let input = RegisterInput {
        email: email.clone(),
        name,
        password,
    };
    let user = client.register(&input).await.context("Registration failed")?;

    remember_email(config, email);
    println!("Registered and logged in as {}", describe(&user));
    Ok(())
}

pub async fn whoami(client: &GraphQLClient) -> Result<()> {
    if !client.session().is_authenticated() {
        bail!("Not logged in. Run `shopfront login` first.");
    }
    let user = client.me().await.context("Failed to fetch account")?;
    println!("{}", describe(&user));
    println!("  id:       {}", user.id);
    println!("  verified: {}", if user.email_verified { "yes" } else { "no" });
    println!("  active:   {}", if user.is_active { "yes" } else { "no" });
    Ok(())
}

/// Local view only; never prints credential values.
pub fn status(client: &GraphQLClient, config: &Config) {
    let session = client.session().snapshot();

    println!("Endpoint:      {}", client.endpoint());
    println!("Storage:       {:?}", config.token_storage);
    match session.user().filter(|_| session.is_authenticated()) {
        Some(user) => println!("Session:       {}", describe(user)),
        None => println!("Session:       logged out"),
    }
    println!(
        "Refresh token: {}",
        if session.refresh_token().is_some() { "present" } else { "absent" }
    );

    println!("Pages:");
    for (label, access) in [
        ("shop", Access::Public),
        ("login", Access::GuestOnly),
        ("account", Access::Authenticated),
        ("admin", Access::Staff),
    ] {
        println!("  {:<8} {}", label, decision_label(route_decision(&session, access)));
    }
}

pub async fn query(
    client: &GraphQLClient,
    file: &Path,
    variables: Option<&str>,
    operation: Option<String>,
) -> Result<()> {
    let document = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut request = GraphQLRequest::new(document);
    if let Some(variables) = variables {
        request = request.with_variables(parse_variables(variables)?);
    }
    if let Some(operation) = operation {
        request = request.with_operation_name(operation);
    }

    let data: serde_json::Value = client.execute(&request).await?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

fn parse_variables(raw: &str) -> Result<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(raw).context("Variables are not valid JSON")?;
    if !value.is_object() {
        bail!("Variables must be a JSON object");
    }
    Ok(value)
}

fn remember_email(config: &mut Config, email: String) {
    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
}

fn describe(user: &User) -> String {
    format!("{} <{}> ({})", user.name, user.email, user.role.display_name())
}

fn decision_label(decision: RouteDecision) -> &'static str {
    match decision {
        RouteDecision::Pending => "pending",
        RouteDecision::Allow => "allowed",
        RouteDecision::RedirectToLogin => "redirect to login",
        RouteDecision::RedirectToHome => "redirect to home",
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn read_password(label: &str) -> Result<SecretString> {
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password(label).context("Failed to read password")?,
    };
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(SecretString::from(password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variables_object() {
        let value = parse_variables(r#"{"first": 10}"#).unwrap();
        assert_eq!(value["first"], 10);
    }

    #[test]
    fn test_parse_variables_rejects_non_object() {
        assert!(parse_variables("[1, 2]").is_err());
        assert!(parse_variables("not json").is_err());
    }

    #[test]
    fn test_decision_labels() {
        assert_eq!(decision_label(RouteDecision::Pending), "pending");
        assert_eq!(decision_label(RouteDecision::RedirectToLogin), "redirect to login");
    }
}
