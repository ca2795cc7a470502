//! Pet and profile commands

use anyhow::Result;
use petsite_core::domain::{Gender, NewPet, ProfileEdit};
use petsite_core::services::navigation::can_write;
use petsite_core::services::{LogEvent, Route};

use super::{get_context, get_logger, log_event, open_page};
use crate::output;

pub async fn home(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let page = open_page(&ctx, Route::UserHome).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page.view)?);
    } else {
        output::print_user_home(&page.view);
    }
    page.close().await;
    Ok(())
}

pub async fn create_pet(name: String, gender: Gender) -> Result<()> {
    let ctx = get_context()?;
    let page = open_page(&ctx, Route::CreatePet).await?;
    let owner = page.view.uid().map(str::to_string);
    page.close().await;

    let Some(owner) = owner else {
        anyhow::bail!("You need to sign in first.");
    };
    let pet = ctx
        .profile_service
        .append_pet(&owner, NewPet::new(name, gender))
        .await?;

    log_event(&get_logger(), LogEvent::new("pet_created").with_route(Route::CreatePet.path()));
    output::success(&format!("{} joined your family!", pet.pet_name));
    Ok(())
}

pub async fn profile(user_id: Option<String>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let page = open_page(&ctx, Route::Home).await?;
    let viewer = page.view.uid().map(str::to_string);
    page.close().await;

    let Some(user_id) = user_id.or_else(|| viewer.clone()) else {
        anyhow::bail!("Pass a user ID or sign in to see your own profile.");
    };
    log_event(
        &get_logger(),
        LogEvent::new("page_opened").with_route(Route::Profile(user_id.clone()).path()),
    );

    let profile_page = ctx
        .profile_service
        .profile_page(&user_id, viewer.as_deref())
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile_page)?);
    } else {
        output::print_profile_page(&profile_page);
    }
    Ok(())
}

/// Pages that change a profile are only writable by its owner
async fn owned_profile(ctx: &petsite_core::PetsiteContext) -> Result<String> {
    let page = open_page(ctx, Route::Home).await?;
    let owner = page.view.uid().map(str::to_string);
    let writable = owner
        .as_ref()
        .is_some_and(|uid| can_write(&Route::Profile(uid.clone()), &page.view));
    page.close().await;

    match owner {
        Some(uid) if writable => Ok(uid),
        _ => anyhow::bail!("You need to sign in to change your profile."),
    }
}

pub async fn feature(pet_name: String) -> Result<()> {
    let ctx = get_context()?;
    let owner = owned_profile(&ctx).await?;

    let pets = ctx.profile_service.set_featured_pet(&owner, &pet_name).await?;
    match pets.iter().find(|p| p.featured) {
        Some(pet) => output::success(&format!("{} is now your featured pet.", pet.pet_name)),
        None => output::info("No pet is featured now."),
    }
    Ok(())
}

pub async fn edit_profile(
    username: Option<String>,
    image: Option<String>,
    clear_image: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let owner = owned_profile(&ctx).await?;

    let edit = ProfileEdit {
        username,
        profile_image_url: if clear_image { Some(None) } else { image.map(Some) },
    };
    if edit.is_empty() {
        output::warning("Nothing to change. Pass --username, --image or --clear-image.");
        return Ok(());
    }

    let profile = ctx.profile_service.edit_profile(&owner, edit).await?;
    output::success(&format!("Profile updated for {}.", profile.username));
    Ok(())
}
