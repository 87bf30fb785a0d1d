//! Integration tests for generational reloading across batches.
//!
//! Every scenario drives a [`ModuleManager`] through several batches built from in-memory
//! archives and checks the identities the modules end up loaded under.

use std::sync::Arc;

use modscope::prelude::*;

/// Main image of `name`, referencing `references` and defining `{name}.{name}`.
fn main_image(name: &str, references: &[&str]) -> ModuleImage {
    let mut image = ModuleImage::new(name, ModuleVersion::new(1, 0, 0, 0));
    for reference in references {
        image.add_reference(*reference, ModuleVersion::new(1, 0, 0, 0));
    }
    let host = image.add_reference("Host", ModuleVersion::new(1, 4, 0, 0));
    image.add_type(
        format!("{name}.{name}"),
        Some((TypeScope::Reference(host), "Mod")),
    );
    image
}

fn module(name: &str, minor: u16, references: &[ModuleReference]) -> MemoryArchive {
    let names: Vec<&str> = references.iter().map(|r| r.name.as_str()).collect();
    let mut archive = MemoryArchive::new(name, ModuleVersion::new(1, minor, 0, 0))
        .with_file(format!("{name}.All.dll"), main_image(name, &names).to_bytes());
    for reference in references {
        archive = archive.with_reference(reference.clone());
    }
    archive
}

fn batch(archives: Vec<MemoryArchive>) -> Vec<Arc<dyn ModuleArchive>> {
    archives
        .into_iter()
        .map(|archive| Arc::new(archive) as Arc<dyn ModuleArchive>)
        .collect()
}

fn identity_of(entries: &[ModuleEntry], name: &str) -> String {
    entries
        .iter()
        .find(|entry| entry.name == name)
        .map(|entry| entry.image.identity().to_string())
        .unwrap_or_default()
}

#[test]
fn dependent_follows_reloaded_dependency() -> Result<()> {
    let mut manager = ModuleManager::default();
    let token = CancellationToken::new();

    let entries = manager.instantiate_modules(
        &batch(vec![
            module("ModA", 0, &[]),
            module("ModB", 0, &[ModuleReference::hard("ModA")]),
        ]),
        &token,
    )?;
    assert_eq!(identity_of(&entries, "ModA"), "ModA#1");
    assert_eq!(identity_of(&entries, "ModB"), "ModB#1");

    let entries = manager.instantiate_modules(
        &batch(vec![
            module("ModA", 1, &[]),
            module("ModB", 0, &[ModuleReference::hard("ModA")]),
        ]),
        &token,
    )?;
    assert_eq!(identity_of(&entries, "ModA"), "ModA#2");
    assert_eq!(identity_of(&entries, "ModB"), "ModB#2");

    let definition = manager.main_definition("ModB#2")?;
    assert!(definition.references_name("ModA#2"));
    assert!(!definition.references_name("ModA#1"));

    // stale generations stay resident
    assert!(manager.resolution().is_loaded("ModA#1"));
    assert_eq!(manager.resolution().loaded_count(), 4);
    Ok(())
}

#[test]
fn unrelated_modules_keep_their_generation() -> Result<()> {
    let mut manager = ModuleManager::default();
    let token = CancellationToken::new();
    let first = || {
        batch(vec![
            module("A", 0, &[]),
            module("B", 0, &[ModuleReference::hard("C")]),
            module("C", 0, &[]),
        ])
    };

    manager.instantiate_modules(&first(), &token)?;

    let entries = manager.instantiate_modules(
        &batch(vec![
            module("A", 0, &[]),
            module("B", 0, &[ModuleReference::hard("C")]),
            module("C", 3, &[]),
        ]),
        &token,
    )?;

    assert_eq!(identity_of(&entries, "A"), "A#1");
    assert_eq!(identity_of(&entries, "B"), "B#2");
    assert_eq!(identity_of(&entries, "C"), "C#2");
    assert!(manager.main_definition("B#2")?.references_name("C#2"));
    assert_eq!(manager.dependencies_of("B"), vec!["C".to_string()]);
    assert!(manager.dependencies_of("A").is_empty());
    Ok(())
}

#[test]
fn weak_reference_upgrades_when_dependency_arrives() -> Result<()> {
    let mut manager = ModuleManager::default();
    let token = CancellationToken::new();

    let entries = manager.instantiate_modules(
        &batch(vec![module("ModB", 0, &[ModuleReference::weak("ModA")])]),
        &token,
    )?;
    assert_eq!(identity_of(&entries, "ModB"), "ModB#1");
    assert!(manager.main_definition("ModB#1")?.references_name("ModA#0"));
    assert!(!manager.diagnostics().has_warnings());

    let entries = manager.instantiate_modules(
        &batch(vec![
            module("ModA", 0, &[]),
            module("ModB", 0, &[ModuleReference::weak("ModA")]),
        ]),
        &token,
    )?;
    assert_eq!(identity_of(&entries, "ModB"), "ModB#2");
    assert!(manager.main_definition("ModB#2")?.references_name("ModA#1"));
    Ok(())
}

#[test]
fn missing_hard_reference_is_reported() -> Result<()> {
    let mut manager = ModuleManager::default();

    manager.instantiate_modules(
        &batch(vec![module("ModB", 0, &[ModuleReference::hard("ModA")])]),
        &CancellationToken::new(),
    )?;

    let warnings = manager.diagnostics().for_module("ModB");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].severity, DiagnosticSeverity::Warning);
    assert!(manager
        .graph()
        .get("ModB")
        .is_some_and(|node| node.weak_dependencies().contains("ModA")));
    Ok(())
}

#[test]
fn dependency_cycles_are_rejected() {
    let mut manager = ModuleManager::default();

    let error = manager
        .instantiate_modules(
            &batch(vec![
                module("Solo", 0, &[]),
                module("A", 0, &[ModuleReference::hard("B")]),
                module("B", 0, &[ModuleReference::hard("A")]),
            ]),
            &CancellationToken::new(),
        )
        .unwrap_err();

    assert!(matches!(
        error,
        Error::DependencyCycle { ref module, ref cycle } if module == "B" && cycle == &["B", "A", "B"]
    ));
    assert!(manager.diagnostics().has_errors());

    // modules ordered before the cycle still load
    let graph = manager.graph();
    assert!(!graph.get("Solo").is_some_and(ModuleNode::needs_reload));
    assert!(graph.get("B").is_some_and(ModuleNode::needs_reload));
    assert_eq!(manager.resolution().loaded_count(), 1);
}

struct CancelAt {
    token: CancellationToken,
    index: usize,
}

impl LoadProgress for CancelAt {
    fn set_current_module(&self, index: usize, _name: &str) {
        if index == self.index {
            self.token.cancel();
        }
    }
}

#[test]
fn cancellation_stops_between_modules() -> Result<()> {
    let token = CancellationToken::new();
    let mut manager = ModuleManager::default().with_progress(CancelAt {
        token: token.clone(),
        index: 1,
    });
    let modules = || {
        batch(vec![
            module("A", 0, &[]),
            module("B", 0, &[]),
            module("C", 0, &[]),
        ])
    };

    let result = manager.instantiate_modules(&modules(), &token);
    assert!(matches!(result, Err(Error::Cancelled)));

    // the first module is complete, the others were never started
    let graph = manager.graph();
    assert!(!graph.get("A").is_some_and(ModuleNode::needs_reload));
    assert!(graph.get("B").is_some_and(ModuleNode::needs_reload));
    assert!(graph.get("C").is_some_and(ModuleNode::needs_reload));
    assert!(manager.module_images("B").is_empty());
    assert!(manager.module_images("C").is_empty());
    assert_eq!(manager.resolution().loaded_count(), 1);

    let mut manager = manager.with_progress(NoProgress);
    let entries = manager.instantiate_modules(&modules(), &CancellationToken::new())?;
    assert_eq!(entries.len(), 3);
    assert_eq!(identity_of(&entries, "A"), "A#1");
    assert_eq!(identity_of(&entries, "B"), "B#1");
    assert_eq!(identity_of(&entries, "C"), "C#1");
    assert_eq!(manager.resolution().loaded_count(), 3);
    Ok(())
}

#[test]
fn cancellation_before_last_module() {
    let token = CancellationToken::new();
    let mut manager = ModuleManager::default().with_progress(CancelAt {
        token: token.clone(),
        index: 2,
    });

    let result = manager.instantiate_modules(
        &batch(vec![
            module("A", 0, &[]),
            module("B", 0, &[ModuleReference::hard("A")]),
            module("C", 0, &[ModuleReference::hard("B")]),
        ]),
        &token,
    );
    assert!(matches!(result, Err(Error::Cancelled)));

    let graph = manager.graph();
    assert!(!graph.get("B").is_some_and(ModuleNode::needs_reload));
    assert!(graph.get("C").is_some_and(ModuleNode::needs_reload));
    assert_eq!(manager.resolution().loaded_count(), 2);
}

struct NamingActivator;

impl EntryActivator for NamingActivator {
    fn activate(
        &self,
        image: &LoadedImage,
        entry_type: &TypeDef,
    ) -> Result<Box<dyn std::any::Any + Send + Sync>> {
        if entry_type.name.starts_with("Broken") {
            return Err(Error::Rewrite {
                identity: image.identity().to_string(),
                message: "constructor failed".to_string(),
            });
        }
        Ok(Box::new(format!("{} from {}", entry_type.name, image.identity())))
    }
}

#[test]
fn activation_failures_do_not_block_the_batch() {
    let mut manager = ModuleManager::default().with_activator(NamingActivator);

    let error = manager
        .instantiate_modules(
            &batch(vec![module("Broken", 0, &[]), module("Fine", 0, &[])]),
            &CancellationToken::new(),
        )
        .unwrap_err();

    assert_eq!(error.modules(), vec!["Broken"]);
    assert!(manager.diagnostics().has_errors());

    let Error::Instantiation { entries, .. } = &error else {
        panic!("unexpected error {error:?}");
    };
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "Fine");
    assert_eq!(
        entries[0].instance.downcast_ref::<String>().map(String::as_str),
        Some("Fine.Fine from Fine#1")
    );
}

#[test]
fn entries_carry_instances_and_properties() -> Result<()> {
    let mut manager = ModuleManager::default().with_activator(NamingActivator);
    let properties = BuildProperties {
        side: ExecutionSide::Client,
        display_name: "Mod A".to_string(),
        host_version: ModuleVersion::new(1, 4, 4, 9),
        ..BuildProperties::default()
    };

    let entries = manager.instantiate_modules(
        &batch(vec![module("ModA", 0, &[]).with_properties(properties)]),
        &CancellationToken::new(),
    )?;

    let entry = &entries[0];
    assert_eq!(
        entry.instance.downcast_ref::<String>().map(String::as_str),
        Some("ModA.ModA from ModA#1")
    );
    assert_eq!(entry.side, ExecutionSide::Client);
    assert_eq!(entry.display_name, "Mod A");
    assert_eq!(entry.host_version, ModuleVersion::new(1, 4, 4, 9));
    assert_eq!(
        manager.owner_of(entry.image.id()).as_deref(),
        Some("ModA")
    );
    assert_eq!(
        manager
            .first_module_in_trace([ImageId(u64::MAX), entry.image.id()])
            .as_deref(),
        Some("ModA")
    );
    Ok(())
}

#[test]
fn host_resolver_answers_for_core_and_modules() -> Result<()> {
    let mut manager = ModuleManager::default();
    manager.instantiate_modules(&batch(vec![module("ModA", 0, &[])]), &CancellationToken::new())?;

    let resolver = manager.install_resolver();
    assert!(matches!(
        resolver.resolve("Host, Version=1.4.4.9, Culture=neutral"),
        Some(Resolved::Host)
    ));
    assert!(matches!(
        resolver.resolve("ModA#1, Version=1.0.0.0"),
        Some(Resolved::Module(ref image)) if image.owner() == "ModA"
    ));
    assert!(resolver.resolve("ModA").is_none());
    assert!(std::ptr::eq(resolver, manager.install_resolver()));
    Ok(())
}
