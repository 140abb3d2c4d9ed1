#[cfg(any(
    feature = "compression-gzip",
    feature = "compression-zstd",
    feature = "compression-bzip2",
    feature = "compression-xz"
))]
mod compression_tests {
    use anyhow::Result;
    use ironsieve::io::compression::{builtin_codecs, detect_from_magic, detect_from_name, open_input};
    use ironsieve::{CleansingEngine, EngineConfig};
    use std::io::{BufRead, Read, Write};

    const CSV: &str = "no,name,created_date\n1,alice,2024/01/01\n,bob,2024/01/01\n";

    fn read_all(data: Vec<u8>, name: &str) -> Result<String> {
        let mut out = String::new();
        open_input(std::io::Cursor::new(data), name)?.read_to_string(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_plain_passthrough() -> Result<()> {
        assert_eq!(read_all(CSV.as_bytes().to_vec(), "data.csv")?, CSV);
        assert_eq!(read_all(Vec::new(), "empty.csv")?, "");
        Ok(())
    }

    #[test]
    fn test_builtin_codecs_listed() {
        let names: Vec<&str> = builtin_codecs().iter().map(|c| c.name()).collect();
        #[cfg(feature = "compression-gzip")]
        assert!(names.contains(&"gzip"));
        #[cfg(feature = "compression-xz")]
        assert!(names.contains(&"xz"));
        assert!(!names.is_empty());
    }

    #[cfg(feature = "compression-gzip")]
    fn gzip(data: &[u8]) -> Result<Vec<u8>> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data)?;
        Ok(enc.finish()?)
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_gzip_by_extension_and_magic() -> Result<()> {
        let packed = gzip(CSV.as_bytes())?;
        assert_eq!(read_all(packed.clone(), "data.csv.gz")?, CSV);
        assert_eq!(read_all(packed.clone(), "DATA.CSV.GZ")?, CSV);
        assert_eq!(read_all(packed, "no-extension")?, CSV);
        assert_eq!(detect_from_name("x.gz").map(|c| c.name()), Some("gzip"));
        assert_eq!(detect_from_magic(&[0x1f, 0x8b, 0x08]).map(|c| c.name()), Some("gzip"));
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_concatenated_gzip_members() -> Result<()> {
        let mut packed = gzip(b"no,name,created_date\n1,a,2024/01/01\n")?;
        packed.extend(gzip(b"2,b,2024/01/01\n")?);
        let lines: Vec<String> = open_input(std::io::Cursor::new(packed), "x.gz")?
            .lines()
            .collect::<std::io::Result<_>>()?;
        assert_eq!(lines.len(), 3);
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_engine_over_gzip_input() -> Result<()> {
        let packed = gzip(CSV.as_bytes())?;
        let input = open_input(std::io::Cursor::new(packed), "users.csv.gz")?;
        let engine = CleansingEngine::new(EngineConfig::default())?;
        let out = engine.run(input, Vec::new(), Vec::new())?;
        assert_eq!(out.summary.accepted_records, 1);
        assert_eq!(out.summary.rejected_records, 1);
        Ok(())
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn test_zstd_roundtrip() -> Result<()> {
        let packed = zstd::encode_all(CSV.as_bytes(), 3)?;
        assert_eq!(read_all(packed.clone(), "data.csv.zst")?, CSV);
        assert_eq!(read_all(packed, "data.bin")?, CSV);
        Ok(())
    }

    #[cfg(feature = "compression-bzip2")]
    #[test]
    fn test_bzip2_roundtrip() -> Result<()> {
        let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        enc.write_all(CSV.as_bytes())?;
        let packed = enc.finish()?;
        assert_eq!(read_all(packed, "data.csv.bz2")?, CSV);
        Ok(())
    }

    #[cfg(feature = "compression-xz")]
    #[test]
    fn test_xz_roundtrip() -> Result<()> {
        let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
        enc.write_all(CSV.as_bytes())?;
        let packed = enc.finish()?;
        assert_eq!(read_all(packed.clone(), "data.csv.xz")?, CSV);
        assert_eq!(read_all(packed, "data")?, CSV);
        Ok(())
    }

    #[test]
    fn test_unknown_extension_without_magic_is_plain() {
        assert!(detect_from_name("data.csv").is_none());
        assert!(detect_from_magic(b"no,name").is_none());
        assert!(detect_from_magic(b"").is_none());
    }
}
