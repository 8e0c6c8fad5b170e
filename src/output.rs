use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

/// Serialize the final assignment, one community id per line in vertex
/// order. Vertices without a community are written as -1.
pub fn write_communities(path: impl AsRef<Path>, communities: &[i64]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("cannot create output file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for community in communities {
        writeln!(writer, "{}", community)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod test_output {
    use std::fs;

    use super::*;

    #[test]
    fn test_write_communities() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.txt");
        write_communities(&path, &[0, 1, 1, -1, 0]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "0\n1\n1\n-1\n0\n");
    }
}
