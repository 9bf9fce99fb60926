use std::process;

use crate::{FormDefinition, ValidationErrors};

/// Exits the program with an error message
pub fn exit_with_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

/// Exits the program with an error message and usage information
pub fn exit_with_usage_error(message: &str, usage: &str) -> ! {
    eprintln!("Error: {}", message);
    eprintln!("{}", usage);
    process::exit(1);
}

/// Prints formatted JSON with proper indentation
pub fn print_json<T>(value: &T) -> Result<(), serde_json::Error>
where
    T: serde::Serialize,
{
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints a formatted JSON value or exits with error
pub fn print_json_or_exit<T>(value: &T, context: &str)
where
    T: serde::Serialize,
{
    if let Err(e) = print_json(value) {
        exit_with_error(&format!("Failed to format {} JSON: {}", context, e));
    }
}

/// Loads a form definition or exits with error
pub fn load_definition_or_exit(path: &str) -> FormDefinition {
    FormDefinition::from_path(path)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to load {}: {}", path, e)))
}

/// Prints one model's verdict: `<path> pass`, or `<path> fail` followed by the errors
pub fn print_verdict(path: &str, errors: &ValidationErrors, verbose: bool) {
    if errors.is_empty() {
        if verbose {
            println!("{} pass", path);
        }
    } else {
        println!("{} fail", path);
        print_json_or_exit(errors, "validation errors");
    }
}
