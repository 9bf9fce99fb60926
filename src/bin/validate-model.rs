use std::fs;
use std::process;

use arrrg::CommandLine;
use arrrg_derive::CommandLine;
use serde_json::Value;

use formulary::cli_utils::{
    exit_with_error, exit_with_usage_error, load_definition_or_exit, print_verdict,
};
use formulary::{FormDefinition, ValidationErrors};

const USAGE: &str = "USAGE: validate-model --definition <form.yaml> [--verbose] <model.json>...";

#[derive(CommandLine, Default, PartialEq, Eq)]
struct Options {
    #[arrrg(required, "Form definition (YAML, or JSON when the file ends in .json)")]
    definition: String,
    #[arrrg(flag, "Enable verbose output showing pass/fail for each file")]
    verbose: bool,
}

async fn validate_file(definition: &FormDefinition, path: &str) -> Result<ValidationErrors, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path, e))?;
    let model: Value =
        serde_json::from_str(&content).map_err(|e| format!("cannot parse {}: {}", path, e))?;
    let form = definition
        .builder()
        .map_err(|e| e.to_string())?
        .model(model)
        .build();
    form.mount();
    form.validate();
    form.settle().await;
    form.unmount();
    Ok(form.errors())
}

fn main() {
    let (options, free) = Options::from_command_line(USAGE);

    if free.is_empty() {
        exit_with_usage_error("no model files given", USAGE);
    }

    let definition = load_definition_or_exit(&options.definition);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to start runtime: {}", e)));

    let all_valid = runtime.block_on(async {
        let mut all_valid = true;
        for path in &free {
            match validate_file(&definition, path).await {
                Ok(errors) => {
                    print_verdict(path, &errors, options.verbose);
                    all_valid &= errors.is_empty();
                }
                Err(message) => {
                    eprintln!("Error: {}", message);
                    if options.verbose {
                        println!("{} fail", path);
                    }
                    all_valid = false;
                }
            }
        }
        all_valid
    });

    if all_valid {
        process::exit(0);
    } else {
        process::exit(1);
    }
}
