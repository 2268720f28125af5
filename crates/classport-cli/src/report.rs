use std::io::{self, Write};

use classport_core::{ModelSpec, ScoredResult};

/// One block per image followed by a blank line.
pub fn write_results<W: Write>(out: &mut W, results: &[ScoredResult]) -> io::Result<()> {
    for result in results {
        writeln!(out, "{result}")?;
    }
    out.flush()
}

pub fn write_spec<W: Write>(out: &mut W, spec: &ModelSpec) -> io::Result<()> {
    for input in &spec.inputs {
        writeln!(out, "input  {}: {}", input.name, input.kind)?;
    }
    for output in &spec.outputs {
        writeln!(out, "output {}: {}", output.name, output.kind)?;
    }
    out.flush()
}
