//! A small inspector for sample files: prints the record count, the flat
//! samples, and the inline samples with their stacks, for each file given on
//! the command line.

use std::env;
use std::process;

use sample_profile::{read_samples, Error, SampleData};

fn main() {
    let paths: Vec<String> = env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: sample-profile <sample-file>...");
        process::exit(2);
    }

    let mut status = 0;
    for path in paths {
        let data = match SampleData::load(&path) {
            Ok(data) => data,
            Err(err) => {
                eprintln!("{path}: {err}");
                status = 1;
                continue;
            }
        };

        let mut errors: Vec<Error> = Vec::new();
        let (index, num_samples) = read_samples(data.bytes(), &mut |e| errors.push(e));
        println!("There are {num_samples} samples in file {path}.");
        for err in &errors {
            eprintln!("{path}: {err}");
        }
        if !errors.is_empty() {
            status = 1;
        }

        let mut flat: Vec<_> = index.flat_samples().collect();
        flat.sort_by_key(|s| (s.func, s.file, s.line));
        for sample in flat {
            println!(
                "  {}:{} {}: freq={} num_instr={}",
                sample.file, sample.line, sample.func, sample.freq, sample.num_instr
            );
        }

        let mut inline: Vec<_> = index.inline_samples().collect();
        inline.sort_by_key(|s| (s.func, s.file, s.line));
        for sample in inline {
            let stack: Vec<String> = sample
                .stack
                .iter()
                .map(|frame| format!("{}:{}", frame.file, frame.line))
                .collect();
            if sample.line == 0 {
                println!(
                    "  [{}] {} {}: total_samples={}",
                    stack.join(" "),
                    sample.file,
                    sample.func,
                    sample.freq
                );
            } else {
                println!(
                    "  [{}] {}:{} {}: freq={} num_instr={}",
                    stack.join(" "),
                    sample.file,
                    sample.line,
                    sample.func,
                    sample.freq,
                    sample.num_instr
                );
            }
        }
    }
    process::exit(status);
}
