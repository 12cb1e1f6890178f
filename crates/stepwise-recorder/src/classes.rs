use crate::config::ClassListing;
use crate::error::RecordError;
use crate::host::LoadedClass;
use facet::Facet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[derive(Facet, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassCounts {
    pub user: usize,
    pub boot: usize,
    pub skipped_arrays: usize,
}

/// Writes one class signature per line, boot-path classes to `boot` and
/// everything else to `user`. Array classes are skipped.
pub fn partition_classes(
    classes: &[LoadedClass],
    user: &mut impl Write,
    boot: &mut impl Write,
) -> io::Result<ClassCounts> {
    let mut counts = ClassCounts::default();
    for class in classes {
        if class.is_array() {
            counts.skipped_arrays += 1;
        } else if class.boot {
            writeln!(boot, "{}", class.signature)?;
            counts.boot += 1;
        } else {
            writeln!(user, "{}", class.signature)?;
            counts.user += 1;
        }
    }
    Ok(counts)
}

pub fn write_class_listing(
    classes: &[LoadedClass],
    listing: &ClassListing,
) -> Result<ClassCounts, RecordError> {
    let mut user = create(&listing.classes)?;
    let mut boot = create(&listing.boot_classes)?;
    let counts = partition_classes(classes, &mut user, &mut boot)
        .map_err(|err| RecordError::io("writing class listing", err))?;
    user.flush()
        .and_then(|()| boot.flush())
        .map_err(|err| RecordError::io("flushing class listing", err))?;
    Ok(counts)
}

fn create(path: &Path) -> Result<BufWriter<File>, RecordError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| RecordError::Open {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(signature: &str, boot: bool) -> LoadedClass {
        LoadedClass {
            signature: signature.into(),
            boot,
        }
    }

    #[test]
    fn splits_by_loader_and_skips_arrays() {
        let classes = [
            class("Ljava/lang/Object;", true),
            class("LMain;", false),
            class("[I", true),
            class("[LMain;", false),
            class("Ljava/lang/String;", true),
            class("LMain$Worker;", false),
        ];
        let mut user = Vec::new();
        let mut boot = Vec::new();
        let counts = partition_classes(&classes, &mut user, &mut boot).expect("in-memory write");

        assert_eq!(
            counts,
            ClassCounts {
                user: 2,
                boot: 2,
                skipped_arrays: 2,
            }
        );
        assert_eq!(
            String::from_utf8_lossy(&boot),
            "Ljava/lang/Object;\nLjava/lang/String;\n"
        );
        assert_eq!(String::from_utf8_lossy(&user), "LMain;\nLMain$Worker;\n");
    }
}
