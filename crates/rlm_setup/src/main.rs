//! Interactive setup wizard: writes a `.env` file with the API key for a
//! chosen backend. Mirrors the provider menu shape of the original Python
//! setup script, scaled to the five backends RLM actually supports.

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Password, Select};
use rlm::Backend;
use std::collections::BTreeMap;
use std::path::Path;

struct Provider {
    backend: Backend,
    name: &'static str,
    docs_url: &'static str,
}

const PROVIDERS: &[Provider] = &[
    Provider {
        backend: Backend::OpenAi,
        name: "OpenAI - GPT-4, GPT-4o, GPT-3.5 models",
        docs_url: "https://platform.openai.com/api-keys",
    },
    Provider {
        backend: Backend::Anthropic,
        name: "Anthropic - Claude models",
        docs_url: "https://console.anthropic.com/settings/keys",
    },
    Provider {
        backend: Backend::Gemini,
        name: "Google Gemini - Gemini Pro, Gemini Flash models",
        docs_url: "https://aistudio.google.com/apikey",
    },
    Provider {
        backend: Backend::Cerebras,
        name: "Cerebras - Llama-based models with fast inference",
        docs_url: "https://cloud.cerebras.ai/",
    },
    Provider {
        backend: Backend::OpenRouter,
        name: "OpenRouter - access to multiple providers through one API",
        docs_url: "https://openrouter.ai/keys",
    },
];

fn load_existing_env(path: &Path) -> BTreeMap<String, String> {
    let Ok(iter) = dotenvy::from_path_iter(path) else {
        return BTreeMap::new();
    };
    iter.filter_map(|item| item.ok()).collect()
}

fn write_env_file(path: &Path, provider_name: &str, values: &BTreeMap<String, String>) -> std::io::Result<()> {
    let mut content = format!(
        "# RLM - Environment Variables\n# Configured for: {provider_name}\n# Generated by rlm-setup\n\n"
    );
    for (key, value) in values {
        content.push_str(&format!("{key}={value}\n"));
    }
    std::fs::write(path, content)
}

fn main() {
    println!("RLM Setup Wizard");
    println!();

    let theme = ColorfulTheme::default();
    let names: Vec<&str> = PROVIDERS.iter().map(|p| p.name).collect();
    let choice = Select::with_theme(&theme)
        .with_prompt("Select a provider")
        .items(&names)
        .default(0)
        .interact();

    let choice = match choice {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Setup cancelled: {e}");
            std::process::exit(1);
        }
    };
    let provider = &PROVIDERS[choice];

    println!("\nSelected: {}", provider.name);
    println!("Documentation: {}\n", provider.docs_url);

    let env_var = provider.backend.env_var();
    let key = Password::with_theme(&theme)
        .with_prompt(env_var)
        .allow_empty_password(true)
        .interact();

    let key = match key {
        Ok(k) => k,
        Err(e) => {
            eprintln!("Setup cancelled: {e}");
            std::process::exit(1);
        }
    };

    if key.is_empty() {
        println!("\nNo credentials provided. Skipping .env generation.");
        return;
    }

    let env_path = Path::new(".env");
    let mut values = load_existing_env(env_path);

    if !values.is_empty() {
        println!("\nExisting .env file found with the following keys:");
        for existing_key in values.keys() {
            println!("  - {existing_key}");
        }
        let merge = Confirm::with_theme(&theme)
            .with_prompt("Merge new value into existing .env?")
            .default(true)
            .interact()
            .unwrap_or(true);
        if !merge {
            println!("Setup cancelled. No changes made.");
            return;
        }
    }

    values.insert(env_var.to_string(), key);

    match write_env_file(env_path, provider.name, &values) {
        Ok(()) => println!("\nCreated/updated: {}", env_path.display()),
        Err(e) => {
            eprintln!("Failed to write .env: {e}");
            std::process::exit(1);
        }
    }

    println!("\nSetup complete. Run rlm_chat or rlm_server to get started.");
}
