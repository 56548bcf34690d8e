use clap::Parser;

use crate::cli::Cli;
use crate::cli::parse_pair;
use crate::process_exit_code;

#[test]
fn test_parse_pair() {
    assert_eq!(parse_pair("HOME=/"), Ok(("HOME".to_string(), "/".to_string())));
    assert_eq!(parse_pair("/a=b=c"), Ok(("/a".to_string(), "b=c".to_string())));
    assert_eq!(parse_pair("EMPTY="), Ok(("EMPTY".to_string(), String::new())));
    assert!(parse_pair("novalue").is_err());
    assert!(parse_pair("=x").is_err());
}

#[test]
fn test_cli_collects_repeated_flags() {
    let cli = Cli::try_parse_from([
        "wasirun",
        "guests/perl.wasm",
        "--env",
        "A=1",
        "--env",
        "B=2",
        "--file",
        "/script.pl=./script.pl",
        "--dump",
        "/out.txt=out.txt",
        "--",
        "/script.pl",
        "--verbose",
    ])
    .expect("Failed to parse arguments");

    assert_eq!(cli.env.len(), 2);
    assert_eq!(cli.files, vec![("/script.pl".to_string(), "./script.pl".to_string())]);
    assert_eq!(cli.dumps, vec![("/out.txt".to_string(), "out.txt".to_string())]);
    assert_eq!(cli.entry, "_start");
    assert!(!cli.strict_imports);
    assert_eq!(cli.argv(), vec!["perl", "/script.pl", "--verbose"]);
}

#[test]
fn test_cli_rejects_malformed_pair() {
    assert!(Cli::try_parse_from(["wasirun", "m.wasm", "--file", "nohost"]).is_err());
}

#[test]
fn test_exit_codes_outside_byte_range_fail() {
    assert_eq!(process_exit_code(0), 0);
    assert_eq!(process_exit_code(44), 44);
    assert_eq!(process_exit_code(255), 255);
    assert_eq!(process_exit_code(256), 1);
    assert_eq!(process_exit_code(-1), 1);
    assert_eq!(process_exit_code(i32::MIN), 1);
}
