//! CLI process tests
#[cfg(test)]
use serial_test::serial;

#[cfg(test)]
#[serial]
mod test_cli {
    use std::process::{Command, Output};

    fn argus(args: &[&str]) -> Output {
        Command::new("cargo")
            .arg("run")
            .arg("--quiet")
            .arg("--")
            .args(args)
            .output()
            .unwrap_or_else(|err| panic!("Failed to execute: {err}"))
    }

    fn stdout(output: &Output) -> String {
        String::from_utf8(output.stdout.clone()).unwrap()
    }

    #[test]
    fn test_help() {
        let output = argus(&["--help"]);
        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8(output.stderr).unwrap()
        );
    }

    #[test]
    fn test_reach_reachable() {
        let output = argus(&[
            "reach",
            "./tests/resources/toggle.smv",
            "--target",
            "x = 1",
        ]);
        assert_eq!(output.status.code(), Some(0));
        let out = stdout(&output);
        assert!(out.contains("Target is reachable"), "stdout: {out}");
        assert!(out.contains("-- step 1"), "stdout: {out}");
    }

    #[test]
    fn test_reach_counter_witness() {
        let output = argus(&[
            "reach",
            "./tests/resources/counter.smv",
            "--target",
            "c = 5",
        ]);
        assert_eq!(output.status.code(), Some(0));
        let out = stdout(&output);
        assert!(out.contains("6 steps"), "stdout: {out}");
        assert!(out.contains("c = 5"), "stdout: {out}");
    }

    #[test]
    fn test_reach_unreachable() {
        let output = argus(&[
            "reach",
            "./tests/resources/blocked.smv",
            "--target",
            "c = 5",
        ]);
        assert_eq!(output.status.code(), Some(0));
        assert!(stdout(&output).contains("Target is unreachable"));
    }

    #[test]
    fn test_reach_type_error_exits_nonzero() {
        let output = argus(&[
            "reach",
            "./tests/resources/toggle.smv",
            "--target",
            "x = 2",
        ]);
        assert_eq!(output.status.code(), Some(1));
    }

    #[test]
    fn test_reach_global_constraint() {
        let output = argus(&[
            "reach",
            "./tests/resources/counter.smv",
            "--target",
            "c = 4",
            "--constraint",
            "c < 3",
        ]);
        assert_eq!(output.status.code(), Some(0));
        assert!(stdout(&output).contains("Target is unreachable"));
    }

    #[test]
    fn test_init_consistency_ok() {
        let output = argus(&["init-consistency", "./tests/resources/toggle.smv"]);
        assert_eq!(output.status.code(), Some(0));
        assert!(stdout(&output).contains("OK"));
    }

    #[test]
    fn test_init_consistency_ko() {
        let output = argus(&["init-consistency", "./tests/resources/contradictory.smv"]);
        assert_eq!(output.status.code(), Some(0));
        assert!(stdout(&output).contains("KO"));
    }

    #[test]
    fn test_init_consistency_constraint_turns_ko() {
        let output = argus(&[
            "init-consistency",
            "./tests/resources/toggle.smv",
            "--constraint",
            "x = 1",
        ]);
        assert_eq!(output.status.code(), Some(0));
        assert!(stdout(&output).contains("KO"));
    }

    #[test]
    fn test_missing_model_file() {
        let output = argus(&["reach", "./tests/resources/ghost.smv", "--target", "x = 1"]);
        assert_eq!(output.status.code(), Some(1));
    }
}
