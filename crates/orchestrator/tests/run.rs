use config::{Config, Scheduler, WarnedType, Warnings};
use memory::{
    ModuleEntry, ProcessEntry, Protection, ThreadEntry,
    testing::{FakeProcess, FakeSystem},
};
use orchestrator::{Output, ScanTarget, run};
use parking_lot::Mutex;
use pe::testing::PeBuilder;
use pretty_assertions::assert_eq;
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn config(threads: usize, warned_type: WarnedType) -> Config {
    Config {
        warnings: Warnings {
            enabled: true,
            warned_type,
            ..Default::default()
        },
        scheduler: Scheduler {
            threads,
            queue_factor: 1,
        },
        ..Default::default()
    }
}

/// One file with a broken NT signature, one valid file with an
/// unprintable section name.
fn malformed_pair(dir: &Path) -> (PathBuf, PathBuf) {
    let broken = dir.join("a.exe");
    fs::write(&broken, PeBuilder::new(false).corrupt_nt_signature().build()).unwrap();
    let odd = dir.join("b.dll");
    fs::write(
        &odd,
        PeBuilder::new(true).section(b"te\x01xt", vec![0x90; 8]).build(),
    )
    .unwrap();
    (broken, odd)
}

fn with_code(builder: PeBuilder) -> Vec<u8> {
    builder.section(".text", vec![0xC3; 4]).build()
}

/// Warned report blocks keyed by path.
fn warned_blocks(output: &str) -> Vec<(String, Vec<String>)> {
    let (_, report) = output
        .split_once("\nWarned files:\n")
        .expect("warned report missing");
    report
        .split("\nPath: ")
        .filter(|block| !block.is_empty())
        .map(|block| {
            let mut lines = block.lines();
            let path = lines.next().unwrap().to_owned();
            let details = lines.map(|line| line.trim().to_owned()).collect();
            (path, details)
        })
        .collect()
}

#[test]
fn concurrent_scans_attribute_anomalies_to_their_own_file() {
    let dir = tempfile::tempdir().unwrap();
    let (broken, odd) = malformed_pair(dir.path());

    for _ in 0..20 {
        let out = Captured::default();
        let summary = run(
            &config(2, WarnedType::All),
            ScanTarget::Paths(vec![broken.clone(), odd.clone()]),
            &FakeSystem::new(),
            Output::writer(out.clone()),
            &mut out.clone(),
        )
        .unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.records, 2);

        let mut blocks = warned_blocks(&out.text());
        blocks.sort();
        assert_eq!(
            blocks,
            vec![
                (
                    broken.display().to_string(),
                    vec!["Unsupported: Not a valid PE file or architecture.".to_owned()],
                ),
                (
                    odd.display().to_string(),
                    vec!["Suspicious: Detected unprintable section name. Truncating.".to_owned()],
                ),
            ]
        );
    }
}

#[test]
fn tier_filter_drops_other_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let (broken, odd) = malformed_pair(dir.path());

    let out = Captured::default();
    let summary = run(
        &config(2, WarnedType::Suspicious),
        ScanTarget::Paths(vec![broken, odd.clone()]),
        &FakeSystem::new(),
        Output::writer(out.clone()),
        &mut out.clone(),
    )
    .unwrap();
    assert_eq!(summary.records, 1);

    let blocks = warned_blocks(&out.text());
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].0, odd.display().to_string());
}

#[test]
fn directories_are_expanded_recursively() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("nested/deeper");
    fs::create_dir_all(&nested).unwrap();
    let files = [
        dir.path().join("top.dll"),
        dir.path().join("nested/mid.exe"),
        nested.join("notes.txt"),
    ];
    fs::write(&files[0], with_code(PeBuilder::new(true))).unwrap();
    fs::write(&files[1], with_code(PeBuilder::new(false))).unwrap();
    fs::write(&files[2], b"plain text").unwrap();

    let out = Captured::default();
    let summary = run(
        &config(3, WarnedType::All),
        ScanTarget::Paths(vec![dir.path().to_path_buf()]),
        &FakeSystem::new(),
        Output::writer(out.clone()),
        &mut out.clone(),
    )
    .unwrap();

    let text = out.text();
    for file in &files {
        assert!(
            text.contains(&format!("Current File: {}\n", file.display())),
            "{} was not scanned",
            file.display()
        );
    }
    // Only the text file is not a PE image.
    assert_eq!(summary.files, 1);
}

#[test]
fn oversized_files_are_flagged_and_still_scanned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.dll");
    fs::write(&path, with_code(PeBuilder::new(true))).unwrap();
    let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(orchestrator::OVERSIZE_THRESHOLD as u64 + 1).unwrap();
    drop(file);

    let out = Captured::default();
    run(
        &config(1, WarnedType::All),
        ScanTarget::Paths(vec![path]),
        &FakeSystem::new(),
        Output::writer(out.clone()),
        &mut out.clone(),
    )
    .unwrap();

    let text = out.text();
    assert!(text.contains("WARNING! File is over 100MB."));
    assert!(text.contains("Overlay:"));
}

#[test]
fn missing_file_reports_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let out = Captured::default();
    let summary = run(
        &config(1, WarnedType::All),
        ScanTarget::Paths(vec![dir.path().join("gone.exe")]),
        &FakeSystem::new(),
        Output::writer(out.clone()),
        &mut out.clone(),
    )
    .unwrap();
    assert!(out.text().contains("WARNING! Could not open file."));
    assert_eq!(summary.records, 0);
}

const BASE: usize = 0x40_0000;

fn game_system(live: bool) -> FakeSystem {
    let image = PeBuilder::new(false)
        .section(".text", vec![0xC3; 16])
        .import("kernel32.dll", &["ExitProcess"])
        .build();
    let entry = ProcessEntry {
        id: 42,
        threads: 1,
        parent_id: 4,
        priority: 8,
        name: "game.exe".into(),
    };
    let process = live.then(|| FakeProcess::new(42).with_image(BASE, &image, Protection::READONLY));
    FakeSystem::new()
        .with_process(entry, process)
        .with_thread(ThreadEntry {
            usage: 0,
            id: 7,
            owner_id: 42,
            base_priority: 8,
            delta_priority: 0,
            flags: 0,
        })
        .with_module(
            42,
            ModuleEntry {
                base: BASE,
                size: image.len(),
                name: "game.exe".into(),
                path: PathBuf::from("C:\\games\\game.exe"),
            },
        )
}

#[test]
fn process_dump_scans_modules_and_memory_images() {
    let system = game_system(true);
    let out = Captured::default();
    let summary = run(
        &config(1, WarnedType::All),
        ScanTarget::ProcessName("GAME.EXE".into()),
        &system,
        Output::writer(out.clone()),
        &mut out.clone(),
    )
    .unwrap();
    assert_eq!(summary.records, 0);

    let text = out.text();
    for expected in [
        "ID: 0x2A\n",
        "Name: game.exe\n",
        "\tID: 0x7\n",
        "Path (Win32): C:\\fake\\42.exe\n",
        "WoW64: No\n",
        "Modules:\n",
        "\tPath: C:\\games\\game.exe\n",
        "Regions:\n",
        "Memory Images:\n",
        "\tBase: 0x400000\n",
    ] {
        assert!(text.contains(expected), "missing {expected:?} in\n{text}");
    }
    // Module scan and memory image scan both report the 32-bit image.
    assert_eq!(text.matches("64-Bit File: No").count(), 2);
}

#[test]
fn memonly_skips_everything_but_memory_images() {
    let system = game_system(true);
    let mut config = config(1, WarnedType::All);
    config.scan.memonly = true;

    let out = Captured::default();
    run(
        &config,
        ScanTarget::ProcessId(42),
        &system,
        Output::writer(out.clone()),
        &mut out.clone(),
    )
    .unwrap();

    let text = out.text();
    assert!(!text.contains("Modules:"));
    assert!(!text.contains("Regions:"));
    assert!(!text.contains("Threads:\n"));
    assert!(text.contains("Memory Images:"));
    assert_eq!(text.matches("64-Bit File: No").count(), 1);
}

#[test]
fn unopenable_process_is_reported_and_run_completes() {
    let system = game_system(false);
    let out = Captured::default();
    run(
        &config(1, WarnedType::All),
        ScanTarget::ProcessId(42),
        &system,
        Output::writer(out.clone()),
        &mut out.clone(),
    )
    .unwrap();

    let text = out.text();
    assert!(text.contains("Name: game.exe\n"));
    assert!(text.contains("Could not open process for further inspection."));
    assert!(!text.contains("Modules:"));
}

#[test]
fn unknown_process_is_an_error() {
    let result = run(
        &config(1, WarnedType::All),
        ScanTarget::ProcessId(9999),
        &game_system(true),
        Output::quiet(),
        &mut io::sink(),
    );
    assert!(matches!(result, Err(orchestrator::Error::ProcessNotFound(9999))));
}

#[test]
fn quiet_output_still_accumulates_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let (broken, odd) = malformed_pair(dir.path());
    let warned = dir.path().join("warned.txt");

    let mut config = config(2, WarnedType::All);
    config.scan.quiet = true;
    config.warnings.file = Some(warned.clone());

    let summary = run(
        &config,
        ScanTarget::Paths(vec![broken, odd]),
        &FakeSystem::new(),
        Output::quiet(),
        &mut io::sink(),
    )
    .unwrap();
    assert_eq!(summary.records, 2);
    let report = fs::read_to_string(warned).unwrap();
    assert!(report.contains("Not a valid PE file or architecture."));
    assert!(report.contains("Detected unprintable section name. Truncating."));
}

#[test]
fn quiet_run_still_prints_warned_report_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let (broken, odd) = malformed_pair(dir.path());

    let mut config = config(2, WarnedType::All);
    config.scan.quiet = true;

    let stdout = Captured::default();
    let summary = run(
        &config,
        ScanTarget::Paths(vec![broken.clone(), odd.clone()]),
        &FakeSystem::new(),
        Output::quiet(),
        &mut stdout.clone(),
    )
    .unwrap();
    assert_eq!(summary.records, 2);

    let text = stdout.text();
    assert!(!text.contains("Current File:"));
    let mut blocks = warned_blocks(&text);
    blocks.sort();
    assert_eq!(
        blocks.iter().map(|(path, _)| path.clone()).collect::<Vec<_>>(),
        vec![broken.display().to_string(), odd.display().to_string()]
    );
}
