//! Integration tests loading modules from unpacked archive directories.

use std::{fs, path::Path, sync::Arc};

use modscope::prelude::*;

fn write_image(path: &Path, image: &ModuleImage) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, image.to_bytes()).unwrap();
}

/// Unpack a module with one private library into `root`.
fn unpack(root: &Path) {
    write_image(&root.join("lib/Json.dll"), &ModuleImage::new("Json", ModuleVersion::new(13, 0, 0, 0)));

    let mut main = ModuleImage::new("ModA", ModuleVersion::new(1, 0, 0, 0));
    main.add_reference("Json", ModuleVersion::new(13, 0, 0, 0));
    let host = main.add_reference("Host", ModuleVersion::new(1, 4, 0, 0));
    main.add_type("ModA.ModA", Some((TypeScope::Reference(host), "Mod")));
    write_image(&root.join("ModA.FNA.dll"), &main);
    fs::write(root.join("ModA.FNA.pdb"), [7u8; 32]).unwrap();
}

fn open(root: &Path, properties: &BuildProperties) -> Arc<dyn ModuleArchive> {
    Arc::new(
        DirectoryArchive::new(root, "ModA", ModuleVersion::new(1, 0, 0, 0), properties.clone())
            .unwrap(),
    )
}

fn properties() -> BuildProperties {
    BuildProperties {
        lib_references: vec!["Json".to_string()],
        ..BuildProperties::default()
    }
}

#[test]
fn loads_platform_variant_with_libraries() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    unpack(dir.path());

    let mut manager = ModuleManager::default();
    let entries = manager.instantiate_modules(&[open(dir.path(), &properties())], &CancellationToken::new())?;

    let entry = &entries[0];
    assert_eq!(entry.image.identity(), "ModA#1");
    assert_eq!(entry.image.symbols(), Some([7u8; 32].as_slice()));
    assert!(entry.image.image().references_name("ModA#Json#1"));

    let images = manager.module_images("ModA");
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].identity(), "ModA#Json#1");
    Ok(())
}

#[test]
fn changed_content_reloads() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    unpack(dir.path());
    let token = CancellationToken::new();
    let mut manager = ModuleManager::default();

    manager.instantiate_modules(&[open(dir.path(), &properties())], &token)?;
    let unchanged = manager.instantiate_modules(&[open(dir.path(), &properties())], &token)?;
    assert_eq!(unchanged[0].image.identity(), "ModA#1");

    fs::write(dir.path().join("ModA.FNA.pdb"), [8u8; 32]).unwrap();
    let entries = manager.instantiate_modules(&[open(dir.path(), &properties())], &token)?;
    assert_eq!(entries[0].image.identity(), "ModA#2");
    assert!(manager.resolution().is_loaded("ModA#Json#2"));
    Ok(())
}

#[test]
fn direct_attach_keeps_build_identity() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    unpack(dir.path());
    let eac = dir.path().join("obj/ModA.pdb");
    fs::create_dir_all(eac.parent().unwrap()).unwrap();
    fs::write(&eac, [1u8; 8]).unwrap();

    let properties = BuildProperties {
        eac_path: Some(eac.clone()),
        ..properties()
    };

    let mut manager = ModuleManager::new(LoaderConfig::development());
    let entries = manager.instantiate_modules(&[open(dir.path(), &properties)], &CancellationToken::new())?;

    let entry = &entries[0];
    assert_eq!(entry.image.identity(), "ModA");
    assert_eq!(entry.image.symbols(), Some([1u8; 8].as_slice()));
    assert!(manager.graph().get("ModA").is_some_and(ModuleNode::direct_attach));
    Ok(())
}

#[test]
fn missing_main_binary_names_the_module() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("readme.txt"), b"no binaries").unwrap();

    let mut manager = ModuleManager::default();
    let error = manager
        .instantiate_modules(&[open(dir.path(), &BuildProperties::default())], &CancellationToken::new())
        .unwrap_err();

    assert_eq!(error.module(), Some("ModA"));
}
