use crate::models::{AccessControlConfig, PermissionRule, Role, RoutePath};

/// Bump whenever the built-in rule set below changes.
pub const DEFAULT_CONFIG_VERSION: u32 = 1;

/// Every signed-in role.
const MEMBERS: [Role; 6] = [
    Role::ClientStandard,
    Role::ClientPremium,
    Role::Contributor,
    Role::Manager,
    Role::BusinessAdmin,
    Role::SuperAdmin,
];

/// Roles that may open the admin area and its content editors.
const STAFF: [Role; 3] = [Role::Manager, Role::BusinessAdmin, Role::SuperAdmin];

/// default_config
///
/// The configuration adopted on first run, when the store holds no snapshot.
/// It is never used as a fallback for an unreadable or malformed snapshot.
pub fn default_config() -> AccessControlConfig {
    let mut config = AccessControlConfig::new();

    let ordinary = [
        ("/", PermissionRule::public().with_description("Landing page")),
        ("/about", PermissionRule::public()),
        ("/services", PermissionRule::public()),
        ("/contact", PermissionRule::public()),
        ("/login", PermissionRule::public()),
        (
            "/dashboard",
            PermissionRule::restricted(MEMBERS).with_description("Signed-in home"),
        ),
        ("/profile", PermissionRule::restricted(MEMBERS)),
        (
            "/pricing",
            PermissionRule::restricted([
                Role::ClientPremium,
                Role::Manager,
                Role::BusinessAdmin,
                Role::SuperAdmin,
            ])
            .with_description("Premium price list"),
        ),
        (
            "/contribute",
            PermissionRule::restricted([Role::Contributor, Role::Manager, Role::SuperAdmin]),
        ),
    ];

    let admin = [
        ("", PermissionRule::restricted(STAFF).with_description("Admin home")),
        ("hero", PermissionRule::restricted(STAFF)),
        ("services", PermissionRule::restricted(STAFF)),
        ("footer", PermissionRule::restricted(STAFF)),
        ("styles", PermissionRule::restricted([Role::BusinessAdmin, Role::SuperAdmin])),
        ("users", PermissionRule::restricted([Role::BusinessAdmin, Role::SuperAdmin])),
        (
            "permissions",
            PermissionRule::restricted([Role::SuperAdmin])
                .with_description("Route access editor"),
        ),
    ];

    // Keys are literals already in normalized form.
    for (path, rule) in ordinary {
        config
            .routes
            .insert(RoutePath::from_normalized(path.to_string()), rule);
    }
    for (key, rule) in admin {
        config
            .admin_routes
            .insert(RoutePath::from_normalized(key.to_string()), rule);
    }

    config
}
