//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

//! Built-in device schema. A full deployment would obtain this from the
//! YANG compiler; the daemon ships the base system module so it is
//! usable out of the box.

use std::sync::Arc;

use canopy_yang::types::TypeSpec;
use canopy_yang::{SpecBuilder, YangSpec};

pub(crate) fn create_spec() -> Arc<YangSpec> {
    let mut builder = SpecBuilder::new();

    let sys = builder.add_module(
        "canopy-system",
        "urn:canopy:system",
        "2025-03-20",
    );
    builder.add_feature(sys, "dns-resolver");

    let system = builder.container(sys, None, "system");
    builder.leaf(
        sys,
        Some(system),
        "hostname",
        TypeSpec::string()
            .with_length(1, 253)
            .with_pattern(r"[A-Za-z0-9][A-Za-z0-9\-\.]*"),
    );
    builder.leaf(sys, Some(system), "location", TypeSpec::string());

    let clock = builder.container(sys, Some(system), "clock");
    let timezone = builder.leaf(
        sys,
        Some(clock),
        "timezone-name",
        TypeSpec::string(),
    );
    builder.default_value(timezone, "UTC");

    let dns = builder.container(sys, Some(system), "dns-resolver");
    builder.leaf_list(sys, Some(dns), "search", TypeSpec::string());
    let server = builder.list(sys, Some(dns), "server", &["name"]);
    builder.max_elements(server, 8);
    builder.leaf(sys, Some(server), "name", TypeSpec::string());
    let address =
        builder.leaf(sys, Some(server), "address", TypeSpec::string());
    builder.mandatory(address);
    let port = builder.leaf(sys, Some(server), "port", TypeSpec::uint16());
    builder.default_value(port, "53");

    let login = builder.container(sys, Some(system), "login");
    let user = builder.list(sys, Some(login), "user", &["name"]);
    builder.unique(user, &["uid"]);
    builder.leaf(sys, Some(user), "name", TypeSpec::string());
    builder.leaf(sys, Some(user), "uid", TypeSpec::uint32());
    let class = builder.leaf(
        sys,
        Some(user),
        "class",
        TypeSpec::enumeration(&["super-user", "admin", "viewer"]),
    );
    builder.default_value(class, "viewer");

    builder.build()
}
