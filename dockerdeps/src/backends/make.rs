use anyhow::Result;
use dockerfile_ast::Reference;
use std::{io::Write, path::Path};

use crate::{
    classifier::LOCAL_TAG,
    models::{BaseImage, ImageGraph, ImageNode, RecipeName},
    services::RulesBackend,
};

const BUILD_DIR: &str = ".build";
const REMOTE_DIR: &str = ".remote";
const PULL_ONCE: &str = ".pull-once";

/// Renders the image graph as Make rules.
pub struct MakeBackend {
    docker: String,
}

impl MakeBackend {
    pub fn new<S: Into<String>>(docker: S) -> MakeBackend {
        MakeBackend {
            docker: docker.into(),
        }
    }

    fn write_image(&self, node: &ImageNode, out: &mut dyn Write) -> Result<()> {
        let name = make_escape(node.name.as_str());
        let target = build_target(&node.name);
        let image = format!("{}:{}", node.image, LOCAL_TAG);

        writeln!(out, "build-all: build-{}\n", name)?;
        writeln!(out, "push-all: push-{}\n", name)?;
        writeln!(out, ".PHONY: build-{} push-{}\n", name, name)?;
        writeln!(out, "build-{}: {}\n", name, target)?;
        writeln!(out, "push-{}: {}", name, target)?;
        writeln!(out, "\t{} push {}\n", self.docker, image)?;

        writeln!(out, "{}: | {}\n", target, BUILD_DIR)?;

        write!(out, "{}: {}", target, base_dependency(&node.base))?;
        for file in node.files.iter() {
            write!(out, " {}", make_escape(&path_string(file)))?;
        }
        writeln!(out)?;
        writeln!(
            out,
            "\t{} build -t {} {}",
            self.docker,
            image,
            path_string(&node.context)
        )?;
        writeln!(out, "\t@touch $@\n")?;

        Ok(())
    }

    /// Pulls on every run but only rewrites the marker when the image id
    /// changed, so dependents stay fresh across no-op pulls.
    fn write_pull(&self, reference: &Reference, out: &mut dyn Write) -> Result<()> {
        let marker = pull_marker(reference);

        writeln!(out, "{}/{}: {} | {}", REMOTE_DIR, marker, PULL_ONCE, REMOTE_DIR)?;
        writeln!(out, "\t{} pull {}", self.docker, reference)?;
        writeln!(
            out,
            "\t@{} image inspect {} --format '{{{{.Id}}}}' > $(TMPDIR)/{}",
            self.docker, reference, marker
        )?;
        writeln!(out, "\t@cmp -s $(TMPDIR)/{} $@ \\", marker)?;
        writeln!(out, "\t  || mv $(TMPDIR)/{} $@", marker)?;
        writeln!(out, "\t@rm -f $(TMPDIR)/{}\n", marker)?;

        Ok(())
    }
}

impl RulesBackend for MakeBackend {
    fn render(&mut self, graph: &ImageGraph, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "# Generated by dockerdeps, do not edit.")?;
        writeln!(out, "# file dependencies based on ADD and COPY directives\n")?;
        writeln!(out, "TMPDIR ?= /tmp\n")?;

        writeln!(out, ".PHONY: build-all push-all {}\n", PULL_ONCE)?;
        writeln!(out, "build-all:\n")?;
        writeln!(out, "push-all:\n")?;
        writeln!(out, "{}:\n", PULL_ONCE)?;
        writeln!(out, "{}:\n\t@mkdir -p $@\n", BUILD_DIR)?;
        writeln!(out, "{}:\n\t@mkdir -p $@\n", REMOTE_DIR)?;

        for node in graph.images.iter() {
            self.write_image(node, out)?;
        }

        for reference in graph.remotes() {
            self.write_pull(reference, out)?;
        }

        Ok(())
    }
}

/// File name of the marker recording a remote image's id.
pub fn pull_marker(reference: &Reference) -> String {
    format!("{}.image", flatten(&reference.to_string()))
}

/// Marker touched once a recipe's image is built. Every marker sits
/// directly in `.build`, so nested recipes never need a path that is both
/// a file and a directory. The root recipe gets the bare `.image`.
fn build_marker(name: &RecipeName) -> String {
    if name.is_root() {
        ".image".to_string()
    } else {
        format!("{}.image", flatten(name.as_str()))
    }
}

fn build_target(name: &RecipeName) -> String {
    format!("{}/{}", BUILD_DIR, make_escape(&build_marker(name)))
}

/// Maps separators and glob characters onto `_x_` sequences.
///
/// `_` is escaped before anything else is mapped onto it, which keeps the
/// mapping injective.
fn flatten(s: &str) -> String {
    let mut flat = String::with_capacity(s.len());

    for c in s.chars() {
        match c {
            '_' => flat.push_str("_u_"),
            '/' => flat.push_str("_s_"),
            ':' => flat.push_str("_c_"),
            '@' => flat.push_str("_a_"),
            '[' => flat.push_str("_lb_"),
            ']' => flat.push_str("_rb_"),
            c => flat.push(c),
        }
    }

    flat
}

fn base_dependency(base: &BaseImage) -> String {
    match base {
        BaseImage::Local { target } | BaseImage::RegistryRelative { target } => build_target(target),
        BaseImage::Remote { reference } => format!("{}/{}", REMOTE_DIR, pull_marker(reference)),
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn make_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());

    for c in s.chars() {
        match c {
            ' ' => escaped.push_str("\\ "),
            '#' => escaped.push_str("\\#"),
            ':' => escaped.push_str("\\:"),
            '\\' => escaped.push_str("\\\\"),
            '$' => escaped.push_str("$$"),
            c => escaped.push(c),
        }
    }

    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::BTreeSet as Set, path::PathBuf};

    fn reference(s: &str) -> Reference {
        Reference::parse(s).unwrap()
    }

    fn node(name: &str, base: BaseImage, files: &[&str]) -> ImageNode {
        ImageNode {
            name: RecipeName(name.into()),
            image: format!("registry.example.com/{}", name),
            context: PathBuf::from(name),
            base,
            files: files.iter().map(PathBuf::from).collect(),
        }
    }

    fn render(graph: &ImageGraph) -> String {
        let mut out = Vec::new();
        MakeBackend::new("docker").render(graph, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn marker_escapes_separators() {
        assert_eq!(pull_marker(&reference("alpine:3.19")), "alpine_c_3.19.image");
        assert_eq!(
            pull_marker(&reference("ghcr.io/my_org/tool:v1")),
            "ghcr.io_s_my_u_org_s_tool_c_v1.image"
        );
        assert_eq!(
            pull_marker(&reference(
                "busybox@sha256:2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae"
            )),
            "busybox_a_sha256_c_2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae.image"
        );
    }

    #[test]
    fn marker_escapes_ipv6_brackets() {
        let marker = pull_marker(&reference("[::1]:5000/x:1"));

        assert_eq!(marker, "_lb__c__c_1_rb__c_5000_s_x_c_1.image");
        assert!(!marker.contains(|c| c == '[' || c == ']'));
    }

    #[test]
    fn marker_names_do_not_collide() {
        let references = [
            "a/b_c:1",
            "a_s_b_c:1",
            "a/b/c:1",
            "a/b__c:1",
            "a_b/c:1",
            "a/b:c_1",
            "a/b:c.1",
            "a:5000/b:c",
            "a/b_c_1:latest",
            "[::1]:5000/x:1",
        ];

        let markers: Set<_> = references
            .iter()
            .map(|s| pull_marker(&reference(s)))
            .collect();

        assert_eq!(markers.len(), references.len());
    }

    #[test]
    fn local_base_depends_on_build_target() {
        let graph = ImageGraph {
            images: vec![node(
                "app",
                BaseImage::Local {
                    target: RecipeName("base".into()),
                },
                &["app/src/main.go", "app/src/util.go"],
            )],
        };

        let rules = render(&graph);

        assert!(rules.contains(".build/app.image: .build/base.image app/src/main.go app/src/util.go\n"));
        assert!(rules.contains(".build/app.image: | .build\n"));
        assert!(rules.contains("build-app: .build/app.image\n"));
        assert!(rules.contains("build-all: build-app\n"));
        assert!(rules.contains("push-all: push-app\n"));
        assert!(rules.contains("\tdocker build -t registry.example.com/app:local app\n"));
        assert!(rules.contains("\tdocker push registry.example.com/app:local\n"));
        assert!(!rules.contains(".remote/"), "{}", rules);
    }

    #[test]
    fn registry_relative_base_depends_on_stripped_target() {
        let graph = ImageGraph {
            images: vec![node(
                "svc",
                BaseImage::RegistryRelative {
                    target: RecipeName("team/img".into()),
                },
                &[],
            )],
        };

        assert!(render(&graph).contains(".build/svc.image: .build/team_s_img.image\n"));
    }

    #[test]
    fn one_pull_rule_per_remote_reference() {
        let alpine = reference("alpine:3.19");
        let graph = ImageGraph {
            images: vec![
                node("a", BaseImage::Remote { reference: alpine.clone() }, &[]),
                node("b", BaseImage::Remote { reference: alpine }, &[]),
            ],
        };

        let rules = render(&graph);

        assert!(rules.contains(".build/a.image: .remote/alpine_c_3.19.image\n"));
        assert!(rules.contains(".build/b.image: .remote/alpine_c_3.19.image\n"));
        assert_eq!(
            rules
                .matches(".remote/alpine_c_3.19.image: .pull-once | .remote\n")
                .count(),
            1
        );
        assert_eq!(rules.matches("\tdocker pull alpine:3.19\n").count(), 1);
    }

    #[test]
    fn pull_rule_only_replaces_changed_ids() {
        let graph = ImageGraph {
            images: vec![node(
                "a",
                BaseImage::Remote {
                    reference: reference("scratch"),
                },
                &[],
            )],
        };

        let rules = render(&graph);

        assert!(rules.contains(
            "\t@docker image inspect scratch:latest --format '{{.Id}}' > $(TMPDIR)/scratch_c_latest.image\n"
        ));
        assert!(rules.contains("\t@cmp -s $(TMPDIR)/scratch_c_latest.image $@ \\\n\t  || mv $(TMPDIR)/scratch_c_latest.image $@\n"));
    }

    #[test]
    fn empty_graph_still_has_aggregates() {
        let rules = render(&ImageGraph::default());

        assert!(rules.contains("build-all:\n"));
        assert!(rules.contains("push-all:\n"));
        assert!(rules.contains(".build:\n\t@mkdir -p $@\n"));
        assert!(rules.contains("TMPDIR ?= /tmp\n"));
    }

    #[test]
    fn uses_configured_container_cli() {
        let graph = ImageGraph {
            images: vec![node(
                "a",
                BaseImage::Remote {
                    reference: reference("alpine:3.19"),
                },
                &[],
            )],
        };

        let mut out = Vec::new();
        MakeBackend::new("podman").render(&graph, &mut out).unwrap();
        let rules = String::from_utf8(out).unwrap();

        assert!(rules.contains("\tpodman pull alpine:3.19\n"));
        assert!(!rules.contains("docker "));
    }

    #[test]
    fn nested_and_root_recipes_get_flat_markers() {
        let graph = ImageGraph {
            images: vec![
                node(".", BaseImage::Remote { reference: reference("scratch") }, &["Makefile"]),
                node(
                    "base",
                    BaseImage::Local {
                        target: RecipeName(".".into()),
                    },
                    &[],
                ),
                node(
                    "base/tools",
                    BaseImage::Local {
                        target: RecipeName("base".into()),
                    },
                    &["base/tools/bin/run"],
                ),
            ],
        };

        let rules = render(&graph);

        assert!(rules.contains(".build/.image: .remote/scratch_c_latest.image Makefile\n"), "{}", rules);
        assert!(rules.contains(".build/base.image: .build/.image\n"), "{}", rules);
        assert!(rules.contains(".build/base_s_tools.image: .build/base.image base/tools/bin/run\n"), "{}", rules);
        assert!(rules.contains("build-.: .build/.image\n"));
        assert!(rules.contains("build-base/tools: .build/base_s_tools.image\n"));
        assert!(!rules.contains(".build/.:"), "{}", rules);
        assert!(!rules.contains(".build/base/"), "{}", rules);
    }

    #[test]
    fn build_markers_do_not_collide() {
        let names = [".", "base", "base/tools", "base_s_tools", "base_tools", "image", ".image"];

        let markers: Set<_> = names
            .iter()
            .map(|name| build_marker(&RecipeName(name.to_string())))
            .collect();

        assert_eq!(markers.len(), names.len());
        assert!(markers.iter().all(|marker| !marker.contains('/')));
    }

    #[test]
    fn escapes_make_metacharacters_in_files() {
        assert_eq!(make_escape("a dir/#1$x"), "a\\ dir/\\#1$$x");
        assert_eq!(make_escape("src/a:b.txt"), "src/a\\:b.txt");
        assert_eq!(make_escape("win\\path"), "win\\\\path");
    }
}
