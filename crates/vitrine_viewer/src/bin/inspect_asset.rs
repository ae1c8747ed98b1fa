// Debug tool: resolve one asset the way the viewer would and dump the result
// Run with: cargo run --bin inspect_asset -- <asset_root> <name> <format>...

use std::env;
use std::sync::Arc;

use anyhow::{bail, Result};
use vitrine_core::SceneNode;
use vitrine_load::{AssetDescriptor, CatalogEntry, FsFetcher, Resolver};

fn print_node(node: &SceneNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let t = node.transform.translation;
    println!(
        "{}{} @ ({:.3}, {:.3}, {:.3})",
        indent,
        if node.name.is_empty() { "<unnamed>" } else { node.name.as_str() },
        t.x,
        t.y,
        t.z
    );

    if let Some(instance) = &node.mesh {
        let mesh = &instance.mesh;
        let material = &instance.material;
        println!(
            "{}  mesh: {} vertices, {} triangles, normals: {}, uvs: {}",
            indent,
            mesh.vertex_count(),
            mesh.triangle_count(),
            mesh.has_normals(),
            mesh.has_uvs()
        );
        println!(
            "{}  material: {:?} color ({:.3}, {:.3}, {:.3}) opacity {:.2}",
            indent,
            material.name,
            material.base_color.x,
            material.base_color.y,
            material.base_color.z,
            material.opacity
        );
        println!(
            "{}  shadows: cast {}, receive {}",
            indent, instance.cast_shadow, instance.receive_shadow
        );
    }

    for child in &node.children {
        print_node(child, depth + 1);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <asset_root> <name> <format>...", args[0]);
        std::process::exit(1);
    }

    let formats: Vec<&str> = args[3..].iter().map(String::as_str).collect();
    let descriptor = AssetDescriptor::from_entry(&CatalogEntry::new(args[2].as_str(), &formats));
    if descriptor.formats().is_empty() {
        bail!("None of {:?} is a supported format", formats);
    }

    let resolver = Resolver::new(Arc::new(FsFetcher), args[1].as_str());
    println!(
        "Resolving {} under {} ({:?})",
        descriptor.name(),
        resolver.asset_root().display(),
        descriptor.formats()
    );

    match resolver.resolve(&descriptor).await {
        Ok(resolved) => {
            println!("\nLoaded as {}", resolved.format);
            println!(
                "{} mesh(es), {} triangle(s)\n",
                resolved.node.mesh_count(),
                resolved.node.triangle_count()
            );
            print_node(&resolved.node, 0);

            let bounds = resolved.node.bounds();
            if !bounds.is_empty() {
                println!("\nBounds: {} .. {}", bounds.min, bounds.max);
            }
            Ok(())
        }
        Err(exhausted) => {
            println!("\nNo candidate loaded:");
            for failure in &exhausted.failures {
                println!("  {}: {}", failure.format, failure.error);
            }
            std::process::exit(2);
        }
    }
}
