//! XYZ snapshot output, one file per worker.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use kernel::{Particle, Rank};

/// Appends XYZ frames to `<name>.<rank>.xyz`.
///
/// Each frame is the particle count, a `step N` comment line, then one
/// `P x y z` line per particle in store order.
#[derive(Debug)]
pub struct XyzWriter {
    path: PathBuf,
    file: BufWriter<File>,
}

impl XyzWriter {
    /// Create (truncating) the snapshot file for one worker.
    pub fn create(directory: &Path, name: &str, rank: Rank) -> io::Result<Self> {
        let path = directory.join(format!("{name}.{rank}.xyz"));
        let file = BufWriter::new(File::create(&path)?);
        tracing::debug!("writing snapshots to {}", path.display());
        Ok(Self { path, file })
    }

    /// The file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one frame and flush it.
    pub fn write_snapshot(&mut self, step: u64, particles: &[Particle]) -> io::Result<()> {
        writeln!(self.file, "{}", particles.len())?;
        writeln!(self.file, "step {step}")?;
        for p in particles {
            writeln!(
                self.file,
                "P {} {} {}",
                p.position[0], p.position[1], p.position[2]
            )?;
        }
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn frames_append_in_xyz_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = XyzWriter::create(dir.path(), "run", 2).unwrap();
        assert!(writer.path().ends_with("run.2.xyz"));

        let particles = vec![
            Particle { id: 1, position: [0.5, -1.0, 2.0], velocity: [0.0; 3] },
            Particle { id: 2, position: [3.0, 4.0, 5.0], velocity: [0.0; 3] },
        ];
        writer.write_snapshot(0, &particles).unwrap();
        writer.write_snapshot(1, &particles[..1]).unwrap();

        let contents = fs::read_to_string(writer.path()).unwrap();
        let expected = "2\nstep 0\nP 0.5 -1 2\nP 3 4 5\n1\nstep 1\nP 0.5 -1 2\n";
        assert_eq!(contents, expected);
    }

    #[test]
    fn empty_store_still_writes_a_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = XyzWriter::create(dir.path(), "empty", 0).unwrap();
        writer.write_snapshot(3, &[]).unwrap();
        assert_eq!(fs::read_to_string(writer.path()).unwrap(), "0\nstep 3\n");
    }
}
