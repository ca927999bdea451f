use chrono::Datelike;

use crate::{
    api::{
        Condition, CountryCode, FuelType, ImageId, ImageUpload, Language, Listing, ListingId,
        ListingImage, ListingInfo, ListingSubmission, MainPhoto, Plan, Time, Transmission,
        MAX_DESCRIPTION_LEN, MAX_IMAGES, MIN_IMAGES,
    },
    locale,
};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum WizardStep {
    PlanSelection,
    BasicInfo,
    Details,
    Images,
    Review,
    Submitted,
}

impl WizardStep {
    pub fn next(self) -> Option<WizardStep> {
        use WizardStep::*;
        match self {
            PlanSelection => Some(BasicInfo),
            BasicInfo => Some(Details),
            Details => Some(Images),
            Images => Some(Review),
            Review => Some(Submitted),
            Submitted => None,
        }
    }

    pub fn prev(self) -> Option<WizardStep> {
        use WizardStep::*;
        match self {
            PlanSelection | Submitted => None,
            BasicInfo => Some(PlanSelection),
            Details => Some(BasicInfo),
            Images => Some(Details),
            Review => Some(Images),
        }
    }
}

/// What the seller has typed in so far
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ListingDraft {
    pub plan: Option<Plan>,

    pub title: String,
    pub make: String,
    pub model: String,
    pub year: Option<i32>,
    pub price: Option<i64>,
    pub country: Option<CountryCode>,
    pub city: String,

    pub mileage_km: Option<i64>,
    pub body_type: String,
    pub transmission: Option<Transmission>,
    pub fuel_type: Option<FuelType>,
    pub condition: Option<Condition>,
    pub color: String,
    pub description: String,

    /// The "I confirm this information is accurate" checkbox
    pub confirmed: bool,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ValidationIssue {
    MissingPlan,
    MissingTitle,
    MissingMake,
    MissingModel,
    InvalidYear { max: i32 },
    InvalidPrice,
    MissingCountry,
    UnsupportedCountry,
    MissingCity,
    InvalidMileage,
    MissingTransmission,
    MissingFuelType,
    MissingCondition,
    DescriptionTooLong,
    TooFewImages,
    TooManyImages,
    NoMainPhoto,
    NotConfirmed,
}

impl ValidationIssue {
    pub fn step(&self) -> WizardStep {
        use ValidationIssue::*;
        match self {
            MissingPlan => WizardStep::PlanSelection,
            MissingTitle | MissingMake | MissingModel | InvalidYear { .. } | InvalidPrice
            | MissingCountry | UnsupportedCountry | MissingCity => WizardStep::BasicInfo,
            InvalidMileage | MissingTransmission | MissingFuelType | MissingCondition
            | DescriptionTooLong => WizardStep::Details,
            TooFewImages | TooManyImages | NoMainPhoto => WizardStep::Images,
            NotConfirmed => WizardStep::Review,
        }
    }

    pub fn message(&self, lang: Language) -> String {
        use ValidationIssue::*;
        let (en, ar) = match self {
            MissingPlan => ("Please choose a plan", "يرجى اختيار الباقة"),
            MissingTitle => ("Please enter a title", "يرجى إدخال عنوان الإعلان"),
            MissingMake => ("Please enter the make", "يرجى إدخال الشركة المصنعة"),
            MissingModel => ("Please enter the model", "يرجى إدخال الطراز"),
            InvalidYear { max } => {
                return match lang {
                    Language::En => format!("The year must be between 1900 and {max}"),
                    Language::Ar => format!("يجب أن تكون سنة الصنع بين 1900 و {max}"),
                }
            }
            InvalidPrice => ("Please enter a valid price", "يرجى إدخال سعر صحيح"),
            MissingCountry => ("Please choose a country", "يرجى اختيار الدولة"),
            UnsupportedCountry => (
                "We do not operate in this country yet",
                "لا نعمل في هذه الدولة حالياً",
            ),
            MissingCity => ("Please enter the city", "يرجى إدخال المدينة"),
            InvalidMileage => ("Please enter a valid mileage", "يرجى إدخال عدد كيلومترات صحيح"),
            MissingTransmission => ("Please choose a transmission", "يرجى اختيار ناقل الحركة"),
            MissingFuelType => ("Please choose a fuel type", "يرجى اختيار نوع الوقود"),
            MissingCondition => ("Please choose the condition", "يرجى اختيار حالة السيارة"),
            DescriptionTooLong => ("The description is too long", "الوصف طويل جداً"),
            TooFewImages => ("Please add at least one photo", "يرجى إضافة صورة واحدة على الأقل"),
            TooManyImages => ("You can add up to 10 photos", "يمكنك إضافة 10 صور كحد أقصى"),
            NoMainPhoto => ("Please choose a main photo", "يرجى اختيار الصورة الرئيسية"),
            NotConfirmed => (
                "Please confirm the information is accurate",
                "يرجى تأكيد صحة المعلومات",
            ),
        };
        String::from(match lang {
            Language::En => en,
            Language::Ar => ar,
        })
    }
}

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum WizardError {
    #[error("step {step:?} is incomplete: {issues:?}")]
    Incomplete {
        step: WizardStep,
        issues: Vec<ValidationIssue>,
    },

    #[error("the listing was already submitted")]
    AlreadySubmitted,

    #[error("the review step must be completed with finish()")]
    FinishRequired,

    #[error("finish() can only be called from the review step, not {0:?}")]
    NotAtReview(WizardStep),

    #[error("no photo at index {0}")]
    NoSuchImage(usize),

    #[error("a listing holds at most {MAX_IMAGES} photos")]
    TooManyImages,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DraftImage {
    Existing(ListingImage),
    New(ImageUpload),
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct ImageSlot {
    image: DraftImage,

    /// Only existing images are kept around once removed, to be deleted on submission
    removed: bool,
}

/// The "sell your car" flow, from plan selection to submission
#[derive(Clone, Debug)]
pub struct SellWizard {
    step: WizardStep,
    editing: Option<ListingId>,
    current_year: i32,
    draft: ListingDraft,
    images: Vec<ImageSlot>,
    main: Option<usize>,
}

impl SellWizard {
    pub fn new(now: Time) -> SellWizard {
        SellWizard {
            step: WizardStep::PlanSelection,
            editing: None,
            current_year: now.year(),
            draft: ListingDraft::default(),
            images: Vec::new(),
            main: None,
        }
    }

    /// Opens the wizard on an already existing listing
    pub fn edit(listing: &Listing, images: Vec<ListingImage>, now: Time) -> SellWizard {
        let info = &listing.info;
        let main = images.iter().position(|i| i.is_main);
        SellWizard {
            step: WizardStep::PlanSelection,
            editing: Some(listing.id),
            current_year: now.year(),
            draft: ListingDraft {
                plan: Some(match listing.is_featured {
                    true => Plan::Featured,
                    false => Plan::Free,
                }),
                title: info.title.clone(),
                make: info.make.clone(),
                model: info.model.clone(),
                year: Some(info.year),
                price: Some(info.price),
                country: Some(info.country.clone()),
                city: info.city.clone(),
                mileage_km: Some(info.mileage_km),
                body_type: info.body_type.clone().unwrap_or_default(),
                transmission: Some(info.transmission),
                fuel_type: Some(info.fuel_type),
                condition: Some(info.condition),
                color: info.color.clone().unwrap_or_default(),
                description: info.description.clone(),
                confirmed: false,
            },
            images: images
                .into_iter()
                .map(|i| ImageSlot {
                    image: DraftImage::Existing(i),
                    removed: false,
                })
                .collect(),
            main,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn editing(&self) -> Option<ListingId> {
        self.editing
    }

    pub fn draft(&self) -> &ListingDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut ListingDraft {
        &mut self.draft
    }

    /// Images that will be part of the listing, with their index and whether they are the main photo
    pub fn kept_images(&self) -> impl Iterator<Item = (usize, &DraftImage, bool)> {
        self.images
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.removed)
            .map(move |(i, s)| (i, &s.image, self.main == Some(i)))
    }

    fn kept_count(&self) -> usize {
        self.images.iter().filter(|s| !s.removed).count()
    }

    pub fn issues(&self, step: WizardStep) -> Vec<ValidationIssue> {
        use ValidationIssue::*;
        let d = &self.draft;
        let mut res = Vec::new();
        match step {
            WizardStep::PlanSelection => {
                if d.plan.is_none() {
                    res.push(MissingPlan);
                }
            }
            WizardStep::BasicInfo => {
                if d.title.trim().is_empty() {
                    res.push(MissingTitle);
                }
                if d.make.trim().is_empty() {
                    res.push(MissingMake);
                }
                if d.model.trim().is_empty() {
                    res.push(MissingModel);
                }
                let max = self.current_year + 1;
                if !d.year.map_or(false, |y| (1900..=max).contains(&y)) {
                    res.push(InvalidYear { max });
                }
                if !d.price.map_or(false, |p| p > 0) {
                    res.push(InvalidPrice);
                }
                match &d.country {
                    None => res.push(MissingCountry),
                    Some(c) if locale::country(c).is_none() => res.push(UnsupportedCountry),
                    Some(_) => (),
                }
                if d.city.trim().is_empty() {
                    res.push(MissingCity);
                }
            }
            WizardStep::Details => {
                if !d.mileage_km.map_or(false, |m| m >= 0) {
                    res.push(InvalidMileage);
                }
                if d.transmission.is_none() {
                    res.push(MissingTransmission);
                }
                if d.fuel_type.is_none() {
                    res.push(MissingFuelType);
                }
                if d.condition.is_none() {
                    res.push(MissingCondition);
                }
                if d.description.chars().count() > MAX_DESCRIPTION_LEN {
                    res.push(DescriptionTooLong);
                }
            }
            WizardStep::Images => {
                let count = self.kept_count();
                if count < MIN_IMAGES {
                    res.push(TooFewImages);
                }
                if count > MAX_IMAGES {
                    res.push(TooManyImages);
                }
                let main_kept = self
                    .main
                    .and_then(|i| self.images.get(i))
                    .map_or(false, |s| !s.removed);
                if !main_kept {
                    res.push(NoMainPhoto);
                }
            }
            WizardStep::Review => {
                if !d.confirmed {
                    res.push(NotConfirmed);
                }
            }
            WizardStep::Submitted => (),
        }
        res
    }

    fn check(&self, step: WizardStep) -> Result<(), WizardError> {
        let issues = self.issues(step);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(WizardError::Incomplete { step, issues })
        }
    }

    /// Moves to the next step if the current one is complete
    pub fn advance(&mut self) -> Result<WizardStep, WizardError> {
        match self.step {
            WizardStep::Submitted => Err(WizardError::AlreadySubmitted),
            WizardStep::Review => Err(WizardError::FinishRequired),
            step => {
                self.check(step)?;
                self.step = step.next().expect("only the submitted step has no successor");
                Ok(self.step)
            }
        }
    }

    pub fn back(&mut self) -> WizardStep {
        if let Some(prev) = self.step.prev() {
            self.step = prev;
        }
        self.step
    }

    /// Jumps to `target`; going forward requires every step in between to be complete
    pub fn go_to(&mut self, target: WizardStep) -> Result<WizardStep, WizardError> {
        if self.step == WizardStep::Submitted {
            return Err(WizardError::AlreadySubmitted);
        }
        if target == WizardStep::Submitted {
            return Err(WizardError::FinishRequired);
        }
        let mut step = self.step;
        while step < target {
            self.check(step)?;
            step = step.next().expect("only the submitted step has no successor");
        }
        self.step = target;
        Ok(self.step)
    }

    pub fn add_image(&mut self, upload: ImageUpload) -> Result<usize, WizardError> {
        if self.kept_count() >= MAX_IMAGES {
            return Err(WizardError::TooManyImages);
        }
        self.images.push(ImageSlot {
            image: DraftImage::New(upload),
            removed: false,
        });
        let idx = self.images.len() - 1;
        if self.main.is_none() {
            self.main = Some(idx);
        }
        Ok(idx)
    }

    pub fn remove_image(&mut self, idx: usize) -> Result<(), WizardError> {
        let slot = self
            .images
            .get_mut(idx)
            .filter(|s| !s.removed)
            .ok_or(WizardError::NoSuchImage(idx))?;
        if self.main == Some(idx) {
            self.main = None;
        }
        match slot.image {
            DraftImage::Existing(_) => slot.removed = true,
            DraftImage::New(_) => {
                self.images.remove(idx);
                self.main = match self.main {
                    Some(m) if m > idx => Some(m - 1),
                    m => m,
                };
            }
        }
        Ok(())
    }

    /// Undoes the removal of an existing image
    pub fn restore_image(&mut self, idx: usize) -> Result<(), WizardError> {
        if self.kept_count() >= MAX_IMAGES {
            return Err(WizardError::TooManyImages);
        }
        let slot = self
            .images
            .get_mut(idx)
            .filter(|s| s.removed)
            .ok_or(WizardError::NoSuchImage(idx))?;
        slot.removed = false;
        Ok(())
    }

    pub fn set_main(&mut self, idx: usize) -> Result<(), WizardError> {
        match self.images.get(idx) {
            Some(s) if !s.removed => {
                self.main = Some(idx);
                Ok(())
            }
            _ => Err(WizardError::NoSuchImage(idx)),
        }
    }

    /// Completes the review step, yielding what should be sent to the store
    pub fn finish(&mut self) -> Result<ListingSubmission, WizardError> {
        match self.step {
            WizardStep::Review => (),
            WizardStep::Submitted => return Err(WizardError::AlreadySubmitted),
            step => return Err(WizardError::NotAtReview(step)),
        }
        // the draft may have changed since each step was validated
        let mut step = WizardStep::PlanSelection;
        while step != WizardStep::Submitted {
            self.check(step)?;
            step = step.next().expect("only the submitted step has no successor");
        }

        let d = &self.draft;
        let country = d
            .country
            .as_ref()
            .and_then(locale::country)
            .expect("validated basic info has a supported country");
        let non_empty = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| String::from(s))
        };
        let info = ListingInfo {
            title: String::from(d.title.trim()),
            make: String::from(d.make.trim()),
            model: String::from(d.model.trim()),
            year: d.year.expect("validated basic info has a year"),
            mileage_km: d.mileage_km.expect("validated details have a mileage"),
            price: d.price.expect("validated basic info has a price"),
            currency: country.currency(),
            country: country.code(),
            city: String::from(d.city.trim()),
            body_type: non_empty(&d.body_type),
            transmission: d.transmission.expect("validated details have a transmission"),
            fuel_type: d.fuel_type.expect("validated details have a fuel type"),
            condition: d.condition.expect("validated details have a condition"),
            color: non_empty(&d.color),
            description: String::from(d.description.trim()),
        };

        let mut new_images = Vec::new();
        let mut remove_images: Vec<ImageId> = Vec::new();
        let mut main_photo = None;
        for (i, slot) in self.images.iter().enumerate() {
            let is_main = self.main == Some(i);
            match (&slot.image, slot.removed) {
                (DraftImage::Existing(img), true) => remove_images.push(img.id),
                (DraftImage::Existing(img), false) => {
                    if is_main {
                        main_photo = Some(MainPhoto::Existing(img.id));
                    }
                }
                (DraftImage::New(upload), _) => {
                    if is_main {
                        main_photo = Some(MainPhoto::New(new_images.len()));
                    }
                    new_images.push(upload.clone());
                }
            }
        }

        let submission = ListingSubmission {
            plan: d.plan.expect("validated plan selection has a plan"),
            info,
            new_images,
            remove_images,
            main_photo: main_photo.expect("validated images have a main photo"),
        };
        self.step = WizardStep::Submitted;
        tracing::debug!(editing = ?self.editing, "listing wizard completed");
        Ok(submission)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::api::{CurrencyCode, ListingStatus, UserId};

    fn now() -> Time {
        chrono::Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn upload(name: &str) -> ImageUpload {
        ImageUpload {
            file_name: String::from(name),
            content_type: String::from("image/png"),
            data: vec![1, 2, 3],
        }
    }

    fn fill_basic_info(w: &mut SellWizard) {
        let d = w.draft_mut();
        d.title = String::from("Patrol 2019, single owner");
        d.make = String::from("Nissan");
        d.model = String::from("Patrol");
        d.year = Some(2019);
        d.price = Some(185_000);
        d.country = Some(CountryCode::new("SA").unwrap());
        d.city = String::from("Riyadh");
    }

    fn fill_details(w: &mut SellWizard) {
        let d = w.draft_mut();
        d.mileage_km = Some(64_000);
        d.transmission = Some(Transmission::Automatic);
        d.fuel_type = Some(FuelType::Petrol);
        d.condition = Some(Condition::Used);
        d.color = String::from("  ");
    }

    fn incomplete(step: WizardStep, issues: Vec<ValidationIssue>) -> Result<WizardStep, WizardError> {
        Err(WizardError::Incomplete { step, issues })
    }

    #[test]
    fn each_step_is_gated() {
        let mut w = SellWizard::new(now());
        assert_eq!(
            w.advance(),
            incomplete(WizardStep::PlanSelection, vec![ValidationIssue::MissingPlan])
        );
        w.draft_mut().plan = Some(Plan::Featured);
        assert_eq!(w.advance(), Ok(WizardStep::BasicInfo));

        w.draft_mut().year = Some(2026);
        match w.advance() {
            Err(WizardError::Incomplete { step, issues }) => {
                assert_eq!(step, WizardStep::BasicInfo);
                assert!(issues.contains(&ValidationIssue::InvalidYear { max: 2025 }));
                assert!(issues.contains(&ValidationIssue::MissingTitle));
                assert!(issues.contains(&ValidationIssue::MissingCountry));
            }
            r => panic!("unexpected {r:?}"),
        }
        fill_basic_info(&mut w);
        w.draft_mut().country = Some(CountryCode::new("FR").unwrap());
        assert_eq!(
            w.advance(),
            incomplete(WizardStep::BasicInfo, vec![ValidationIssue::UnsupportedCountry])
        );
        fill_basic_info(&mut w);
        assert_eq!(w.advance(), Ok(WizardStep::Details));

        assert!(w.advance().is_err());
        fill_details(&mut w);
        assert_eq!(w.advance(), Ok(WizardStep::Images));

        assert_eq!(
            w.advance(),
            incomplete(
                WizardStep::Images,
                vec![ValidationIssue::TooFewImages, ValidationIssue::NoMainPhoto]
            )
        );
        w.add_image(upload("front.png")).unwrap();
        assert_eq!(w.advance(), Ok(WizardStep::Review));

        assert_eq!(w.advance(), Err(WizardError::FinishRequired));
        assert_eq!(
            w.finish(),
            Err(WizardError::Incomplete {
                step: WizardStep::Review,
                issues: vec![ValidationIssue::NotConfirmed]
            })
        );
        w.draft_mut().confirmed = true;
        let s = w.finish().unwrap();
        assert_eq!(w.step(), WizardStep::Submitted);
        assert_eq!(s.plan, Plan::Featured);
        assert_eq!(s.info.currency, CurrencyCode::new("SAR").unwrap());
        assert_eq!(s.info.color, None);
        assert_eq!(s.main_photo, MainPhoto::New(0));
        assert_eq!(w.finish(), Err(WizardError::AlreadySubmitted));
        assert_eq!(w.back(), WizardStep::Submitted);
    }

    #[test]
    fn navigation() {
        let mut w = SellWizard::new(now());
        assert_eq!(w.back(), WizardStep::PlanSelection);
        w.draft_mut().plan = Some(Plan::Free);
        fill_basic_info(&mut w);
        // jumping forward checks the skipped steps
        assert_eq!(
            w.go_to(WizardStep::Images),
            incomplete(
                WizardStep::Details,
                vec![
                    ValidationIssue::InvalidMileage,
                    ValidationIssue::MissingTransmission,
                    ValidationIssue::MissingFuelType,
                    ValidationIssue::MissingCondition,
                ]
            )
        );
        assert_eq!(w.step(), WizardStep::PlanSelection);
        fill_details(&mut w);
        assert_eq!(w.go_to(WizardStep::Images), Ok(WizardStep::Images));
        assert_eq!(w.go_to(WizardStep::BasicInfo), Ok(WizardStep::BasicInfo));
        assert_eq!(w.back(), WizardStep::PlanSelection);
        assert_eq!(w.go_to(WizardStep::Submitted), Err(WizardError::FinishRequired));
    }

    #[test]
    fn image_management() {
        let mut w = SellWizard::new(now());
        for i in 0..MAX_IMAGES {
            w.add_image(upload(&format!("{i}.png"))).unwrap();
        }
        assert_eq!(w.add_image(upload("extra.png")), Err(WizardError::TooManyImages));
        assert_eq!(w.kept_images().filter(|(_, _, main)| *main).count(), 1);

        w.set_main(3).unwrap();
        w.remove_image(1).unwrap();
        // indices after the removed one shift down
        assert_eq!(
            w.kept_images().find(|(_, _, main)| *main).map(|(i, _, _)| i),
            Some(2)
        );
        w.remove_image(2).unwrap();
        assert!(w.issues(WizardStep::Images).contains(&ValidationIssue::NoMainPhoto));
        assert_eq!(w.set_main(42), Err(WizardError::NoSuchImage(42)));
        assert_eq!(w.remove_image(42), Err(WizardError::NoSuchImage(42)));
    }

    #[test]
    fn editing_existing_listing() {
        let listing = Listing {
            id: ListingId(7),
            seller_id: UserId::stub(),
            info: ListingInfo {
                title: String::from("Civic"),
                make: String::from("Honda"),
                model: String::from("Civic"),
                year: 2020,
                mileage_km: 30_000,
                price: 60_000,
                currency: CurrencyCode::new("AED").unwrap(),
                country: CountryCode::new("AE").unwrap(),
                city: String::from("Sharjah"),
                body_type: Some(String::from("Sedan")),
                transmission: Transmission::Automatic,
                fuel_type: FuelType::Petrol,
                condition: Condition::Used,
                color: None,
                description: String::new(),
            },
            status: ListingStatus::Approved,
            is_featured: false,
            created_at: now(),
        };
        let image = |id: i64, is_main: bool| ListingImage {
            id: ImageId(id),
            car_id: ListingId(7),
            url: format!("http://img/{id}"),
            storage_path: format!("listings/7/{id}.png"),
            is_main,
            created_at: now(),
        };
        let mut w = SellWizard::edit(&listing, vec![image(1, true), image(2, false)], now());
        assert_eq!(w.editing(), Some(ListingId(7)));
        assert_eq!(w.draft().plan, Some(Plan::Free));

        w.remove_image(0).unwrap();
        w.add_image(upload("new.png")).unwrap();
        w.set_main(2).unwrap();
        w.restore_image(0).unwrap();
        w.remove_image(0).unwrap();
        w.draft_mut().confirmed = true;
        assert_eq!(w.go_to(WizardStep::Review), Ok(WizardStep::Review));

        let s = w.finish().unwrap();
        assert_eq!(s.remove_images, vec![ImageId(1)]);
        assert_eq!(s.new_images.len(), 1);
        assert_eq!(s.main_photo, MainPhoto::New(0));
        assert_eq!(s.info.body_type.as_deref(), Some("Sedan"));
        let existing = vec![image(1, true), image(2, false)];
        assert_eq!(s.validate_images(&existing), Ok(()));
    }

    #[test]
    fn messages_are_localized() {
        let issue = ValidationIssue::NoMainPhoto;
        assert_eq!(issue.step(), WizardStep::Images);
        assert_ne!(issue.message(Language::En), issue.message(Language::Ar));
        assert!(ValidationIssue::InvalidYear { max: 2025 }
            .message(Language::En)
            .contains("2025"));
    }
}
