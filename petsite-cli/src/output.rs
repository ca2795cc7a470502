//! Output formatting utilities

use chrono::{DateTime, Utc};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use petsite_core::domain::{Pet, ProfilePage, SessionView};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Table of pets with their stats; the featured one is starred
pub fn pets_table(pets: &[Pet]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["", "Name", "Gender", "Hunger", "Boredom", "Items"]);
    for pet in pets {
        let star = if pet.featured {
            Cell::new("★").fg(Color::Yellow)
        } else {
            Cell::new("")
        };
        let items = pet.collected_items.food.len() + pet.collected_items.toys.len();
        table.add_row(vec![
            star,
            Cell::new(&pet.pet_name),
            Cell::new(pet.gender),
            Cell::new(pet.hunger),
            Cell::new(pet.boredom),
            Cell::new(items),
        ]);
    }
    table
}

/// Render the signed-in user's home page
pub fn print_user_home(view: &SessionView) {
    let Some(user) = &view.user else {
        return;
    };

    println!("{} {}", "Welcome,".bold(), user.username().bold());
    println!("  Email: {}", user.profile.email());
    println!("  Coins: {}", user.profile.currency());
    if !user.profile.is_stored() {
        warning("  No profile saved yet; showing account details only.");
    }
    if let Some(err) = &view.error {
        error(&format!("  Could not load your profile: {}", err));
    }
    println!();

    let pets = user.profile.pets();
    if pets.is_empty() {
        info("You have no pets yet. Create one with `petsite create-pet <NAME>`.");
    } else {
        println!("{}", "Your pets".bold());
        println!("{}", pets_table(pets));
    }
}

/// Render a public profile page
pub fn print_profile_page(page: &ProfilePage) {
    println!("{}", page.username.bold());
    println!(
        "  Member since: {}",
        page.member_since
            .as_ref()
            .map(format_date)
            .unwrap_or_else(|| "N/A".to_string())
    );
    println!("  Coins: {}", page.currency);
    if let Some(url) = &page.profile_image_url {
        println!("  Picture: {}", url);
    }
    println!();

    match &page.featured_pet {
        Some(pet) => println!(
            "{} {} ({}, hunger {}, boredom {})",
            "Featured pet:".bold(),
            pet.pet_name.yellow(),
            pet.gender,
            pet.hunger,
            pet.boredom
        ),
        None => println!("{}", "No featured pet".dimmed()),
    }

    if !page.pets.is_empty() {
        println!();
        println!("{}", pets_table(&page.pets));
    }

    if page.is_owner {
        println!();
        info("This is your profile. Use `petsite feature <PET>` or `petsite edit-profile` to change it.");
    }
}
